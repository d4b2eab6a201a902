//! Operations behind the workout fragments.

use log::{debug, info};

use super::Assistant;
use crate::db::models::{Workout, WorkoutDetail};
use crate::db::operations::{self, SetInput};
use crate::error::LiftlogError;
use crate::tools::{MAX_REPS, MAX_WEIGHT, NO_ACTIVE_WORKOUT};
use crate::ui::{ActionOutcome, Fragment, SetDraft, ViewKey};

impl Assistant {
    /// Get the caller's in-progress workout, if any.
    pub async fn current_workout(&self, username: &str) -> Result<Option<Workout>, LiftlogError> {
        let profile = self.authorize(username).await?;
        Ok(operations::get_in_progress_workout(&self.store, profile.id).await?)
    }

    /// Every workout of the caller with its sets, newest first.
    pub async fn workout_history(&self, username: &str) -> Result<Vec<WorkoutDetail>, LiftlogError> {
        let profile = self.authorize(username).await?;
        let workouts = operations::get_all_workouts(&self.store, profile.id).await?;
        let mut details = Vec::with_capacity(workouts.len());
        for workout in workouts {
            let sets = operations::get_sets_for_workout(&self.store, workout.id).await?;
            details.push(WorkoutDetail { workout, sets });
        }
        Ok(details)
    }

    /// Save the drafted sets from a set-entry form.
    pub async fn save_new_sets(
        &self,
        username: &str,
        workout_id: i32,
        drafts: &[SetDraft],
    ) -> Result<ActionOutcome, LiftlogError> {
        let profile = self.authorize(username).await?;
        debug!(
            "save_new_sets called workout={} drafts={}",
            workout_id,
            drafts.len()
        );
        if drafts.is_empty() {
            return Ok(ActionOutcome::message("There are no sets to save."));
        }
        for draft in drafts {
            if !(1..=MAX_REPS).contains(&i64::from(draft.reps)) {
                return Err(LiftlogError::invalid_arguments(
                    "save_new_sets",
                    format!("reps must be between 1 and {}", MAX_REPS),
                ));
            }
            if !draft.weight.is_finite() || !(0.0..=MAX_WEIGHT).contains(&draft.weight) {
                return Err(LiftlogError::invalid_arguments(
                    "save_new_sets",
                    format!("weight must be between 0 and {}", MAX_WEIGHT),
                ));
            }
        }

        match operations::get_workout(&self.store, profile.id, workout_id).await? {
            Some(w) if w.in_progress => {}
            _ => return Ok(ActionOutcome::message(NO_ACTIVE_WORKOUT)),
        }

        let inputs = drafts
            .iter()
            .map(|d| SetInput {
                exercise_id: d.exercise_id,
                weight: d.weight,
                reps: d.reps,
            })
            .collect();
        let saved = operations::save_sets(&self.store, profile.id, workout_id, inputs).await?;
        info!("Saved {} sets to workout {}", saved.len(), workout_id);

        let mut names: Vec<&str> = Vec::new();
        for draft in drafts {
            if !names.contains(&draft.exercise_name.as_str()) {
                names.push(&draft.exercise_name);
            }
        }
        let detail = operations::get_workout_detail(&self.store, profile.id, workout_id)
            .await?
            .ok_or_else(|| LiftlogError::NotFound(format!("workout {}", workout_id)))?;
        Ok(ActionOutcome::new(Fragment::with_notice(
            format!("Added {}!", names.join(", ")),
            Fragment::WorkoutBreakdown { detail },
        ))
        .invalidating(&[ViewKey::CurrentWorkout]))
    }

    /// Delete one of the caller's sets.
    pub async fn delete_set(&self, username: &str, set_id: i32) -> Result<ActionOutcome, LiftlogError> {
        let profile = self.authorize(username).await?;
        let deleted = operations::delete_set(&self.store, profile.id, set_id).await?;
        if deleted == 0 {
            return Err(LiftlogError::NotFound(format!("set {}", set_id)));
        }
        info!("Deleted set {}", set_id);
        Ok(ActionOutcome::message("Set deleted!").invalidating(&[ViewKey::CurrentWorkout]))
    }

    /// Start a new workout from the creation form, ending any workout still
    /// in progress.
    pub async fn create_workout(
        &self,
        username: &str,
        name: &str,
        location: &str,
    ) -> Result<ActionOutcome, LiftlogError> {
        let profile = self.authorize(username).await?;
        let (workout, ended) = operations::create_workout(&self.store, profile.id, name, location).await?;
        info!(
            "Started workout {} for {} (ended {} previous)",
            workout.id,
            profile.username,
            ended.len()
        );

        let mut text = format!("{} started!", workout.display_name());
        if let Some(previous) = ended.first() {
            text = format!("Finished {} and started {}!", previous.display_name(), workout.display_name());
        }
        let detail = WorkoutDetail {
            workout,
            sets: Vec::new(),
        };
        Ok(
            ActionOutcome::new(Fragment::with_notice(text, Fragment::WorkoutBreakdown { detail }))
                .invalidating(&[ViewKey::CurrentWorkout, ViewKey::ActiveWorkout]),
        )
    }

    /// Finish the workout from a completion card.
    pub async fn complete_workout(
        &self,
        username: &str,
        workout_id: i32,
    ) -> Result<ActionOutcome, LiftlogError> {
        let profile = self.authorize(username).await?;
        if !operations::complete_workout(&self.store, profile.id, workout_id).await? {
            debug!("complete_workout: workout {} is not in progress", workout_id);
            return Ok(ActionOutcome::message(NO_ACTIVE_WORKOUT));
        }
        info!("Completed workout {}", workout_id);
        Ok(ActionOutcome::message("Workout completed!")
            .invalidating(&[ViewKey::CurrentWorkout, ViewKey::ActiveWorkout]))
    }

    /// Add an exercise the caller can log sets against.
    pub async fn create_exercise(&self, username: &str, name: &str) -> Result<ActionOutcome, LiftlogError> {
        let profile = self.authorize(username).await?;
        if name.trim().is_empty() {
            return Err(LiftlogError::invalid_arguments("create_exercise", "name is empty"));
        }
        let (exercise, created) = self.search.create_exercise(profile.id, name).await?;
        let text = if created {
            format!("Added {} to your exercises!", exercise.name)
        } else {
            format!("{} is already one of your exercises.", exercise.name)
        };
        Ok(ActionOutcome::message(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::testing::{USER, assistant, profile_id};
    use crate::llm::MockReply;

    async fn fixture() -> Assistant {
        assistant(|_| MockReply::text("ok")).await
    }

    async fn draft(a: &Assistant, name: &str, reps: i32, weight: f64) -> SetDraft {
        let owner = profile_id(a).await;
        let found = a.search.best_match(name, owner).await.unwrap().unwrap();
        SetDraft {
            exercise_id: found.id,
            exercise_name: found.name,
            reps,
            weight,
        }
    }

    #[tokio::test]
    async fn completing_without_an_active_workout_changes_nothing() {
        let a = fixture().await;
        let started = a.create_workout(USER, "Legs", "").await.unwrap();
        assert!(started.invalidate.contains(&ViewKey::ActiveWorkout));
        let workout = a.current_workout(USER).await.unwrap().unwrap();

        let done = a.complete_workout(USER, workout.id).await.unwrap();
        assert_eq!(done.fragment, Fragment::system("Workout completed!"));
        assert_eq!(done.invalidate, vec![ViewKey::CurrentWorkout, ViewKey::ActiveWorkout]);

        let ended_at = a.workout_history(USER).await.unwrap()[0].workout.ended_at;
        assert!(ended_at.is_some());

        let again = a.complete_workout(USER, workout.id).await.unwrap();
        assert_eq!(again.fragment, Fragment::system(NO_ACTIVE_WORKOUT));
        assert!(again.invalidate.is_empty());
        assert_eq!(a.workout_history(USER).await.unwrap()[0].workout.ended_at, ended_at);
    }

    #[tokio::test]
    async fn identical_creations_give_distinct_completable_workouts() {
        let a = fixture().await;
        a.create_workout(USER, "Push", "Gym").await.unwrap();
        let first = a.current_workout(USER).await.unwrap().unwrap();
        let second_outcome = a.create_workout(USER, "Push", "Gym").await.unwrap();
        assert!(second_outcome.fragment.text().starts_with("Finished Push"));
        let second = a.current_workout(USER).await.unwrap().unwrap();
        assert_ne!(first.id, second.id);

        let done = a.complete_workout(USER, second.id).await.unwrap();
        assert_eq!(done.fragment.text(), "Workout completed!");
        let history = a.workout_history(USER).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|d| !d.workout.in_progress && d.workout.ended_at.is_some()));
    }

    #[tokio::test]
    async fn saved_sets_appear_in_the_breakdown() {
        let a = fixture().await;
        a.create_workout(USER, "Push", "").await.unwrap();
        let workout = a.current_workout(USER).await.unwrap().unwrap();
        let drafts = vec![
            draft(&a, "bench", 5, 135.0).await,
            draft(&a, "bench", 5, 145.0).await,
            draft(&a, "squat", 3, 225.0).await,
        ];

        let outcome = a.save_new_sets(USER, workout.id, &drafts).await.unwrap();
        assert_eq!(outcome.invalidate, vec![ViewKey::CurrentWorkout]);
        assert!(outcome.fragment.text().starts_with("Added Bench Press, Squat!"));
        match &outcome.fragment {
            Fragment::Stack { children } => match &children[1] {
                Fragment::WorkoutBreakdown { detail } => assert_eq!(detail.sets.len(), 3),
                other => panic!("unexpected card {other:?}"),
            },
            other => panic!("unexpected fragment {other:?}"),
        }
    }

    #[tokio::test]
    async fn sets_cannot_be_saved_after_finishing() {
        let a = fixture().await;
        a.create_workout(USER, "Push", "").await.unwrap();
        let workout = a.current_workout(USER).await.unwrap().unwrap();
        let drafts = vec![draft(&a, "deadlift", 5, 315.0).await];
        a.complete_workout(USER, workout.id).await.unwrap();

        let outcome = a.save_new_sets(USER, workout.id, &drafts).await.unwrap();
        assert_eq!(outcome.fragment, Fragment::system(NO_ACTIVE_WORKOUT));
        assert!(a.workout_history(USER).await.unwrap()[0].sets.is_empty());
    }

    #[tokio::test]
    async fn bad_drafts_are_rejected() {
        let a = fixture().await;
        a.create_workout(USER, "Push", "").await.unwrap();
        let workout = a.current_workout(USER).await.unwrap().unwrap();
        let drafts = vec![draft(&a, "bench", 0, 135.0).await];
        assert!(matches!(
            a.save_new_sets(USER, workout.id, &drafts).await,
            Err(LiftlogError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn deleting_a_set_removes_it() {
        let a = fixture().await;
        a.create_workout(USER, "Push", "").await.unwrap();
        let workout = a.current_workout(USER).await.unwrap().unwrap();
        let drafts = vec![draft(&a, "bench", 5, 135.0).await];
        a.save_new_sets(USER, workout.id, &drafts).await.unwrap();
        let set_id = a.workout_history(USER).await.unwrap()[0].sets[0].set.id;

        a.delete_set(USER, set_id).await.unwrap();
        assert!(a.workout_history(USER).await.unwrap()[0].sets.is_empty());
        assert!(matches!(a.delete_set(USER, set_id).await, Err(LiftlogError::NotFound(_))));
    }

    #[tokio::test]
    async fn actions_require_permission() {
        let a = fixture().await;
        assert!(matches!(
            a.create_workout("stranger", "Push", "").await,
            Err(LiftlogError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn new_exercises_become_searchable() {
        let a = fixture().await;
        let outcome = a.create_exercise(USER, "Overhead Press").await.unwrap();
        assert_eq!(outcome.fragment.text(), "Added Overhead Press to your exercises!");
        let again = a.create_exercise(USER, "overhead press").await.unwrap();
        assert!(again.fragment.text().contains("already"));

        let owner = profile_id(&a).await;
        let best = a.search.best_match("overhead", owner).await.unwrap().unwrap();
        assert_eq!(best.name, "Overhead Press");
    }
}
