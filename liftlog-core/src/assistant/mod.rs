//! The conversational assistant.
//!
//! [`Assistant`] ties the store, the model client and exercise search
//! together. Turns live in `turn.rs`; the operations behind the interactive
//! fragments (saving sets, finishing a workout, editing the schedule) live in
//! `actions.rs` and `schedule.rs`.

mod actions;
mod schedule;
mod turn;

pub use turn::TurnOutcome;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{self, Profile, Role};
use crate::config::Config;
use crate::db::Store;
use crate::error::LiftlogError;
use crate::llm::LlmInterface;
use crate::schedule::Weekday;
use crate::search::{Embedder, ExerciseSearch};

pub const SYSTEM_PROMPT: &str = "You are a personal weights tracker for the gym. You can be asked to start workouts, and to record information for a users sets. If you can't find an appropriate function, tell the user to ask a different question.";

const DEFAULT_RETRY_ATTEMPTS: usize = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

pub struct Assistant {
    store: Store,
    llm: Arc<LlmInterface>,
    search: ExerciseSearch,
    default_role: Role,
    seed_exercises: Vec<String>,
    retry_attempts: usize,
    retry_delay: Duration,
    /// Overrides the local weekday; tests pin it.
    today: Option<Weekday>,
}

impl Assistant {
    pub fn new(store: Store, llm: Arc<LlmInterface>, search: ExerciseSearch, config: &Config) -> Self {
        Self {
            store,
            llm,
            search,
            default_role: config.default_role,
            seed_exercises: config.seed_exercises.clone(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            today: None,
        }
    }

    /// Opens the database and builds the model client and embedder
    /// described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Store::open(&config.database_url)?;
        let llm = Arc::new(LlmInterface::from_config(config));
        let search = ExerciseSearch::new(
            store.clone(),
            Embedder::from_provider(&config.embeddings),
            config.match_max_distance,
        );
        Ok(Self::new(store, llm, search, config))
    }

    pub fn with_retry(mut self, attempts: usize, delay: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn with_today(mut self, day: Weekday) -> Self {
        self.today = Some(day);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn search(&self) -> &ExerciseSearch {
        &self.search
    }

    fn today(&self) -> Weekday {
        self.today.unwrap_or_else(Weekday::today)
    }

    async fn authorize(&self, username: &str) -> Result<Profile, LiftlogError> {
        auth::authorize(&self.store, username, self.default_role, &self.seed_exercises).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::db::operations;
    use crate::llm::MockReply;
    use crate::session::Message;

    pub const USER: &str = "casey";

    /// An assistant over an in-memory store with a member profile for
    /// [`USER`], seeded with Bench Press, Deadlift and Squat.
    pub async fn assistant(
        responder: impl Fn(&[Message]) -> MockReply + Send + Sync + 'static,
    ) -> Assistant {
        assistant_with_timeout(responder, Duration::from_secs(5)).await
    }

    pub async fn assistant_with_timeout(
        responder: impl Fn(&[Message]) -> MockReply + Send + Sync + 'static,
        timeout: Duration,
    ) -> Assistant {
        let store = Store::open_in_memory().unwrap();
        let config = Config {
            default_role: Role::User,
            ..Config::default()
        };
        let llm = Arc::new(LlmInterface::new_mock_fn(responder).with_timeout(timeout));
        let search = ExerciseSearch::new(store.clone(), Embedder::local(), config.match_max_distance);
        let assistant = Assistant::new(store, llm, search, &config)
            .with_retry(1, Duration::from_millis(1))
            .with_today(Weekday::Wednesday);

        auth::get_or_create_profile(&assistant.store, USER, Role::Member, &config.seed_exercises)
            .await
            .unwrap();
        assistant
    }

    pub async fn profile_id(assistant: &Assistant) -> i32 {
        let (row, _) = operations::get_or_create_profile(&assistant.store, USER, "member", &[])
            .await
            .unwrap();
        row.id
    }
}
