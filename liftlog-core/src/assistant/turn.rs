use anyhow::Result;
use log::{debug, error, info};

use super::{Assistant, SYSTEM_PROMPT};
use crate::auth::Profile;
use crate::error::LiftlogError;
use crate::llm::ModelEvent;
use crate::session::{Message, SessionState, UiEntry};
use crate::tools::{self, Dispatched, ToolContext};
use crate::ui::{Fragment, UiSink};

const EMPTY_INPUT: &str = "Please type a message first.";
const NO_PERMISSION: &str =
    "You do not have permission to use the assistant yet. Ask an admin to upgrade your account.";
const NO_REPLY: &str = "I'm not sure how to help with that, try asking a different question.";

/// State after a turn, and the entry the turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub state: SessionState,
    pub entry: UiEntry,
}

enum Reply {
    Text(String),
    Tool(Dispatched),
}

impl Assistant {
    /// Runs one turn and returns the updated state and the new UI entry.
    pub async fn submit_message(&self, state: SessionState, input: &str) -> TurnOutcome {
        self.submit_message_streaming(state, input, UiSink::detached())
            .await
    }

    /// Like [`Assistant::submit_message`], sending partial fragments to `sink`
    /// as they become available. The sink always receives exactly one
    /// resolved fragment, equal to the returned entry's display.
    pub async fn submit_message_streaming(
        &self,
        mut state: SessionState,
        input: &str,
        sink: UiSink,
    ) -> TurnOutcome {
        let input = input.trim();
        debug!(
            "submit_message called user={} input_len={}",
            state.username,
            input.len()
        );
        if input.is_empty() {
            return reject(state, sink, Fragment::system(EMPTY_INPUT));
        }

        let profile = match self.authorize(&state.username).await {
            Ok(profile) => profile,
            Err(LiftlogError::Unauthorized) => {
                return reject(state, sink, Fragment::system(NO_PERMISSION));
            }
            Err(e) => {
                error!("Authorization failed for {}: {}", state.username, e);
                return reject(
                    state,
                    sink,
                    Fragment::system(format!("Could not verify your account: {}", e)),
                );
            }
        };

        state.messages.push(Message::user(input));

        let fragment = match self.run_model(&state.messages, &profile, &sink).await {
            Ok(Reply::Text(text)) => {
                let text = if text.trim().is_empty() {
                    NO_REPLY.to_string()
                } else {
                    text
                };
                state.messages.push(Message::assistant(text.clone()));
                Fragment::assistant(text)
            }
            Ok(Reply::Tool(dispatched)) => {
                state.messages.push(dispatched.message);
                dispatched.fragment
            }
            Err(e) => {
                error!("Model call failed for {}: {:#}", state.username, e);
                Fragment::system(format!("Sorry, I couldn't reach the assistant: {}", e))
            }
        };

        sink.resolve(fragment.clone());
        let entry = UiEntry::new(fragment);
        state.ui.push(entry.clone());
        info!(
            "Turn finished user={} messages={} entries={}",
            state.username,
            state.messages.len(),
            state.ui.len()
        );
        TurnOutcome { state, entry }
    }

    async fn run_model(&self, history: &[Message], profile: &Profile, sink: &UiSink) -> Result<Reply> {
        let specs = tools::tool_specs();
        let mut stream = self
            .llm
            .generate_with_retry(
                history,
                SYSTEM_PROMPT,
                &specs,
                self.retry_attempts,
                self.retry_delay,
            )
            .await?;

        let mut text = String::new();
        while let Some(event) = stream.next().await? {
            match event {
                ModelEvent::TextDelta(delta) => {
                    text.push_str(&delta);
                    sink.pending(Fragment::assistant(text.clone()));
                }
                ModelEvent::ToolCall(invocation) => {
                    debug!("Model chose tool {}", invocation.name);
                    let ctx = ToolContext {
                        store: &self.store,
                        search: &self.search,
                        profile,
                        today: self.today(),
                    };
                    return Ok(Reply::Tool(tools::dispatch(&ctx, &invocation, sink).await));
                }
                ModelEvent::Finished => break,
            }
        }
        Ok(Reply::Text(text))
    }
}

/// A turn that changes nothing: the fragment is shown but not recorded.
fn reject(state: SessionState, sink: UiSink, fragment: Fragment) -> TurnOutcome {
    sink.resolve(fragment.clone());
    TurnOutcome {
        state,
        entry: UiEntry::new(fragment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::testing::{USER, assistant, assistant_with_timeout, profile_id};
    use crate::db::operations;
    use crate::llm::MockReply;
    use crate::session::MessageRole;
    use crate::ui::{UiUpdate, ui_channel};
    use serde_json::json;
    use std::time::Duration;

    fn last_user_text(history: &[Message]) -> String {
        history
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.to_lowercase())
            .unwrap_or_default()
    }

    /// Routes the quick-action prompts to their tools, everything else to text.
    fn router(history: &[Message]) -> MockReply {
        let text = last_user_text(history);
        if text.contains("all of my workouts") {
            MockReply::tool("view_all_workouts", json!({}))
        } else if text.contains("current workout") {
            MockReply::tool("view_current_workout", json!({}))
        } else if text.contains("finish") {
            MockReply::tool("complete_workout", json!({}))
        } else if text.contains("broken") {
            MockReply::tool("add_sets", json!({"sets": "lots"}))
        } else if text.contains("fail") {
            MockReply::Fail("model unavailable".into())
        } else {
            MockReply::text("Keep it up!")
        }
    }

    #[tokio::test]
    async fn text_replies_append_user_and_assistant_messages() {
        let a = assistant(router).await;
        let (sink, mut stream) = ui_channel();
        let out = a
            .submit_message_streaming(SessionState::new(USER), "hello there", sink)
            .await;

        assert_eq!(out.state.messages.len(), 2);
        assert_eq!(out.state.messages[0], Message::user("hello there"));
        assert_eq!(out.state.messages[1], Message::assistant("Keep it up!"));
        assert_eq!(out.state.ui, vec![out.entry.clone()]);
        assert_eq!(out.entry.display, Fragment::assistant("Keep it up!"));

        let mut updates = Vec::new();
        while let Some(u) = stream.next().await {
            updates.push(u);
        }
        let (last, partials) = updates.split_last().unwrap();
        assert_eq!(last, &UiUpdate::Resolved(Fragment::assistant("Keep it up!")));
        assert_eq!(partials.len(), 3);
        assert!(partials.iter().all(|u| matches!(u, UiUpdate::Pending(_))));
    }

    #[tokio::test]
    async fn empty_input_changes_nothing() {
        let a = assistant(router).await;
        let state = SessionState::new(USER);
        let out = a.submit_message(state.clone(), "   ").await;
        assert_eq!(out.state, state);
        assert_eq!(out.entry.display, Fragment::system(EMPTY_INPUT));
    }

    #[tokio::test]
    async fn unauthorized_users_change_nothing() {
        let a = assistant(router).await;
        let state = SessionState::new("stranger");
        let out = a.submit_message(state.clone(), "hello").await;
        assert_eq!(out.state, state);
        assert_eq!(out.entry.display, Fragment::system(NO_PERMISSION));
    }

    #[tokio::test]
    async fn all_workouts_prompt_renders_a_table() {
        let a = assistant(router).await;
        let owner = profile_id(&a).await;
        operations::create_workout(a.store(), owner, "Push", "Gym").await.unwrap();
        operations::create_workout(a.store(), owner, "Pull", "Gym").await.unwrap();

        let out = a
            .submit_message(SessionState::new(USER), "Show me all of my workouts")
            .await;
        let table = out
            .entry
            .display
            .walk()
            .into_iter()
            .find_map(|f| match f {
                Fragment::WorkoutTable { workouts } => Some(workouts.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].name, "Pull");

        let last = out.state.messages.last().unwrap();
        assert_eq!(last.role, MessageRole::Function);
        assert_eq!(last.name.as_deref(), Some("view_all_workouts"));
    }

    #[tokio::test]
    async fn finishing_without_a_workout_reports_it() {
        let a = assistant(router).await;
        let out = a
            .submit_message(SessionState::new(USER), "I want to finish my workout")
            .await;
        assert_eq!(out.entry.display.text(), "No currently active workout...");
        assert_eq!(out.state.messages.len(), 2);
        assert_eq!(out.state.messages[1].role, MessageRole::Function);
    }

    #[tokio::test]
    async fn invalid_tool_arguments_record_one_function_message() {
        let a = assistant(router).await;
        let out = a.submit_message(SessionState::new(USER), "broken sets").await;
        assert_eq!(out.state.messages.len(), 2);
        assert!(out.state.messages[1].content.starts_with("rejected:"));
        assert!(matches!(out.entry.display, Fragment::System { .. }));
    }

    #[tokio::test]
    async fn model_failures_become_a_system_entry() {
        let a = assistant(router).await;
        let out = a.submit_message(SessionState::new(USER), "please fail").await;
        assert_eq!(out.state.messages, vec![Message::user("please fail")]);
        assert!(out.entry.display.text().contains("model unavailable"));
        assert_eq!(out.state.ui.len(), 1);
    }

    #[tokio::test]
    async fn stalled_models_time_out_into_a_system_entry() {
        let a = assistant_with_timeout(|_| MockReply::Stall, Duration::from_millis(20)).await;
        let (sink, mut stream) = ui_channel();
        let out = a
            .submit_message_streaming(SessionState::new(USER), "hello?", sink)
            .await;

        assert!(matches!(out.entry.display, Fragment::System { .. }));
        assert!(out.entry.display.text().contains("did not respond"));
        assert_eq!(out.state.messages, vec![Message::user("hello?")]);
        assert_eq!(out.state.ui.len(), 1);

        let mut resolved = Vec::new();
        while let Some(update) = stream.next().await {
            if let UiUpdate::Resolved(fragment) = update {
                resolved.push(fragment);
            }
        }
        assert_eq!(resolved, vec![out.entry.display.clone()]);
    }

    #[tokio::test]
    async fn user_message_count_matches_accepted_turns() {
        let a = assistant(router).await;
        let mut state = SessionState::new(USER);
        for input in ["hi", "", "Show me my current workout's information", "  ", "thanks"] {
            state = a.submit_message(state, input).await.state;
        }
        assert_eq!(state.user_turns(), 3);
        assert_eq!(state.ui.len(), 3);
    }
}
