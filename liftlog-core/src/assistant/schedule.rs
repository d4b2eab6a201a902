//! Operations behind the schedule manager.

use log::{debug, info};

use super::Assistant;
use crate::auth::Profile;
use crate::db::operations;
use crate::error::LiftlogError;
use crate::schedule::{MoveDirection, Weekday, swap_partner};
use crate::tools::schedule_slots;
use crate::ui::{ActionOutcome, Fragment};

impl Assistant {
    /// The schedule manager for all seven days.
    pub async fn schedule_overview(&self, username: &str) -> Result<Fragment, LiftlogError> {
        let profile = self.authorize(username).await?;
        let days = schedule_slots(&self.store, profile.id).await?;
        Ok(Fragment::ScheduleManager { days })
    }

    async fn day_outcome(
        &self,
        profile: &Profile,
        schedule_id: i32,
        text: String,
    ) -> Result<ActionOutcome, LiftlogError> {
        let schedule = operations::get_schedule_by_id(&self.store, profile.id, schedule_id)
            .await?
            .ok_or_else(|| LiftlogError::NotFound(format!("schedule {}", schedule_id)))?;
        let day = Weekday::from_index(schedule.schedule.day)
            .ok_or_else(|| LiftlogError::Common(format!("schedule {} has no valid day", schedule_id)))?;
        Ok(ActionOutcome::new(Fragment::with_notice(
            text,
            Fragment::DaySchedule { day, schedule },
        )))
    }

    /// Configure a weekday that has no schedule yet.
    pub async fn create_schedule_day(
        &self,
        username: &str,
        day: Weekday,
        name: &str,
    ) -> Result<ActionOutcome, LiftlogError> {
        let profile = self.authorize(username).await?;
        if operations::get_schedule_day(&self.store, profile.id, day.index())
            .await?
            .is_some()
        {
            return Ok(ActionOutcome::message(format!(
                "You already have a schedule for {}.",
                day
            )));
        }
        let name = if name.trim().is_empty() {
            format!("{} workout", day)
        } else {
            name.trim().to_string()
        };
        let schedule = operations::create_schedule_day(&self.store, profile.id, day.index(), &name).await?;
        info!("Created schedule {} for {}", schedule.id, day);
        self.day_outcome(&profile, schedule.id, format!("Created your {} schedule!", day))
            .await
    }

    pub async fn rename_schedule_day(
        &self,
        username: &str,
        schedule_id: i32,
        name: &str,
    ) -> Result<ActionOutcome, LiftlogError> {
        let profile = self.authorize(username).await?;
        if name.trim().is_empty() {
            return Err(LiftlogError::invalid_arguments("rename_schedule_day", "name is empty"));
        }
        if operations::rename_schedule_day(&self.store, profile.id, schedule_id, name).await? == 0 {
            return Err(LiftlogError::NotFound(format!("schedule {}", schedule_id)));
        }
        self.day_outcome(&profile, schedule_id, "Schedule renamed!".to_string())
            .await
    }

    /// Append an exercise to a day. The name is matched against the caller's
    /// exercises; an unknown name becomes a new exercise.
    pub async fn add_schedule_exercise(
        &self,
        username: &str,
        schedule_id: i32,
        exercise_name: &str,
    ) -> Result<ActionOutcome, LiftlogError> {
        let profile = self.authorize(username).await?;
        let exercise_name = exercise_name.trim();
        if exercise_name.is_empty() {
            return Err(LiftlogError::invalid_arguments(
                "add_schedule_exercise",
                "exercise name is empty",
            ));
        }
        if operations::get_schedule_by_id(&self.store, profile.id, schedule_id)
            .await?
            .is_none()
        {
            return Err(LiftlogError::NotFound(format!("schedule {}", schedule_id)));
        }

        let (exercise_id, name) = match self.search.best_match(exercise_name, profile.id).await? {
            Some(found) => (found.id, found.name),
            None => {
                let (exercise, _) = self.search.create_exercise(profile.id, exercise_name).await?;
                debug!("Created exercise {} for schedule {}", exercise.id, schedule_id);
                (exercise.id, exercise.name)
            }
        };
        operations::add_schedule_entry(&self.store, profile.id, schedule_id, exercise_id).await?;
        self.day_outcome(&profile, schedule_id, format!("Added {}!", name))
            .await
    }

    /// Move an entry one place up or down. Moving past either end swaps the
    /// first and last entries.
    pub async fn move_schedule_entry(
        &self,
        username: &str,
        schedule_id: i32,
        entry_id: i32,
        direction: MoveDirection,
    ) -> Result<ActionOutcome, LiftlogError> {
        let profile = self.authorize(username).await?;
        let detail = operations::get_schedule_by_id(&self.store, profile.id, schedule_id)
            .await?
            .ok_or_else(|| LiftlogError::NotFound(format!("schedule {}", schedule_id)))?;
        let entries: Vec<_> = detail.entries.into_iter().map(|(entry, _)| entry).collect();
        if !entries.iter().any(|e| e.id == entry_id) {
            return Err(LiftlogError::NotFound(format!("schedule entry {}", entry_id)));
        }

        match swap_partner(&entries, entry_id, direction) {
            Some(partner) => {
                operations::swap_schedule_entries(&self.store, profile.id, schedule_id, entry_id, partner)
                    .await?;
                self.day_outcome(&profile, schedule_id, "Schedule updated!".to_string())
                    .await
            }
            None => {
                self.day_outcome(&profile, schedule_id, "Nothing to reorder.".to_string())
                    .await
            }
        }
    }

    pub async fn remove_schedule_entry(
        &self,
        username: &str,
        schedule_id: i32,
        entry_id: i32,
    ) -> Result<ActionOutcome, LiftlogError> {
        let profile = self.authorize(username).await?;
        if operations::remove_schedule_entry(&self.store, profile.id, schedule_id, entry_id).await? == 0 {
            return Err(LiftlogError::NotFound(format!("schedule entry {}", entry_id)));
        }
        self.day_outcome(&profile, schedule_id, "Exercise removed.".to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::testing::{USER, assistant};
    use crate::db::models::ScheduleDayDetail;
    use crate::llm::MockReply;

    fn day_of(outcome: &ActionOutcome) -> ScheduleDayDetail {
        outcome
            .fragment
            .walk()
            .into_iter()
            .find_map(|f| match f {
                Fragment::DaySchedule { schedule, .. } => Some(schedule.clone()),
                _ => None,
            })
            .unwrap()
    }

    fn names(detail: &ScheduleDayDetail) -> Vec<&str> {
        detail.entries.iter().map(|(_, n)| n.as_str()).collect()
    }

    async fn leg_day(a: &Assistant) -> ScheduleDayDetail {
        let created = a.create_schedule_day(USER, Weekday::Tuesday, "Legs").await.unwrap();
        let id = day_of(&created).schedule.id;
        for name in ["squat", "deadlift", "Lunges"] {
            a.add_schedule_exercise(USER, id, name).await.unwrap();
        }
        let outcome = a.rename_schedule_day(USER, id, "Leg day").await.unwrap();
        day_of(&outcome)
    }

    #[tokio::test]
    async fn exercises_resolve_or_get_created() {
        let a = assistant(|_| MockReply::text("ok")).await;
        let day = leg_day(&a).await;
        assert_eq!(day.schedule.name, "Leg day");
        assert_eq!(names(&day), vec!["Squat", "Deadlift", "Lunges"]);
    }

    #[tokio::test]
    async fn adjacent_moves_swap_only_their_order_values() {
        let a = assistant(|_| MockReply::text("ok")).await;
        let day = leg_day(&a).await;
        let before: Vec<(i32, i32)> = day.entries.iter().map(|(e, _)| (e.id, e.sort_order)).collect();
        let middle = before[1].0;

        let moved = a
            .move_schedule_entry(USER, day.schedule.id, middle, MoveDirection::Up)
            .await
            .unwrap();
        let after = day_of(&moved);
        assert_eq!(names(&after), vec!["Deadlift", "Squat", "Lunges"]);

        let order_of = |id: i32| after.entries.iter().find(|(e, _)| e.id == id).unwrap().0.sort_order;
        assert_eq!(order_of(before[0].0), before[1].1);
        assert_eq!(order_of(before[1].0), before[0].1);
        assert_eq!(order_of(before[2].0), before[2].1);
    }

    #[tokio::test]
    async fn moving_the_first_entry_up_wraps_to_the_end() {
        let a = assistant(|_| MockReply::text("ok")).await;
        let day = leg_day(&a).await;
        let first = day.entries[0].0.id;
        let moved = a
            .move_schedule_entry(USER, day.schedule.id, first, MoveDirection::Up)
            .await
            .unwrap();
        assert_eq!(names(&day_of(&moved)), vec!["Lunges", "Deadlift", "Squat"]);
    }

    #[tokio::test]
    async fn removing_and_duplicate_days() {
        let a = assistant(|_| MockReply::text("ok")).await;
        let day = leg_day(&a).await;
        let removed = a
            .remove_schedule_entry(USER, day.schedule.id, day.entries[1].0.id)
            .await
            .unwrap();
        assert_eq!(names(&day_of(&removed)), vec!["Squat", "Lunges"]);

        let dup = a.create_schedule_day(USER, Weekday::Tuesday, "Again").await.unwrap();
        assert_eq!(dup.fragment.text(), "You already have a schedule for Tuesday.");

        match a.schedule_overview(USER).await.unwrap() {
            Fragment::ScheduleManager { days } => {
                assert_eq!(days.len(), 7);
                assert!(days[2].schedule.is_some());
            }
            other => panic!("unexpected fragment {other:?}"),
        }
    }
}
