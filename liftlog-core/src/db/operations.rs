use anyhow::{Result, anyhow, bail};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::db::Store;
use crate::db::models::{
    DisplayableSet, Exercise, NewExercise, NewProfile, NewSchedule, NewScheduleEntry, NewWorkout,
    NewWorkoutSet, ProfileRow, Schedule, ScheduleDayDetail, ScheduleEntry, Workout,
    WorkoutDetail, WorkoutSet, now_timestamp,
};
use crate::db::schema::{exercises, profiles, schedule_entries, schedules, workout_sets, workouts};

/// One set to be written by [`save_sets`].
#[derive(Debug, Clone, PartialEq)]
pub struct SetInput {
    pub exercise_id: i32,
    pub weight: f64,
    pub reps: i32,
}

// Profiles

/// Returns the profile and whether it was created by this call. A new profile
/// gets one exercise per name in `seed_exercises`, written in the same
/// transaction as the profile.
pub async fn get_or_create_profile(
    store: &Store,
    username: &str,
    default_role: &str,
    seed_exercises: &[String],
) -> Result<(ProfileRow, bool)> {
    let username = username.to_string();
    let role = default_role.to_string();
    let seeds = seed_exercises.to_vec();
    store
        .interact(move |conn| {
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                if let Some(profile) = profiles::table
                    .filter(profiles::username.eq(&username))
                    .select(ProfileRow::as_select())
                    .first(conn)
                    .optional()?
                {
                    return Ok((profile, false));
                }

                let now = now_timestamp();
                let profile = diesel::insert_into(profiles::table)
                    .values(&NewProfile {
                        username,
                        role,
                        created_at: now,
                    })
                    .returning(ProfileRow::as_returning())
                    .get_result(conn)?;

                let mut seeded: Vec<String> = Vec::with_capacity(seeds.len());
                for name in seeds {
                    let name = name.trim().to_string();
                    if name.is_empty() {
                        bail!("Seed exercise names cannot be empty");
                    }
                    if seeded.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
                        continue;
                    }
                    diesel::insert_into(exercises::table)
                        .values(&NewExercise {
                            profile_id: profile.id,
                            name: name.clone(),
                            name_embedding: None,
                            created_at: now,
                        })
                        .execute(conn)?;
                    seeded.push(name);
                }
                Ok((profile, true))
            })
        })
        .await
}

pub async fn set_profile_role(store: &Store, username: &str, role: &str) -> Result<usize> {
    let username = username.to_string();
    let role = role.to_string();
    store
        .interact(move |conn| {
            diesel::update(profiles::table.filter(profiles::username.eq(username)))
                .set(profiles::role.eq(role))
                .execute(conn)
                .map_err(Into::into)
        })
        .await
}

// Exercises

pub async fn get_exercises_for_profile(store: &Store, profile_id: i32) -> Result<Vec<Exercise>> {
    store
        .interact(move |conn| {
            exercises::table
                .filter(exercises::profile_id.eq(profile_id))
                .order(exercises::name.asc())
                .select(Exercise::as_select())
                .load(conn)
                .map_err(Into::into)
        })
        .await
}

/// Case-insensitive lookup by name; creates the exercise when missing.
/// Returns the exercise and whether it was created.
pub async fn get_or_create_exercise(
    store: &Store,
    profile_id: i32,
    name: &str,
    name_embedding: Option<String>,
) -> Result<(Exercise, bool)> {
    let name = name.trim().to_string();
    if name.is_empty() {
        bail!("Exercise name cannot be empty");
    }
    store
        .interact(move |conn| {
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                let existing = exercises::table
                    .filter(exercises::profile_id.eq(profile_id))
                    .select(Exercise::as_select())
                    .load(conn)?
                    .into_iter()
                    .find(|e| e.name.eq_ignore_ascii_case(&name));
                if let Some(exercise) = existing {
                    return Ok((exercise, false));
                }

                let exercise = diesel::insert_into(exercises::table)
                    .values(&NewExercise {
                        profile_id,
                        name,
                        name_embedding,
                        created_at: now_timestamp(),
                    })
                    .returning(Exercise::as_returning())
                    .get_result(conn)?;
                Ok((exercise, true))
            })
        })
        .await
}

pub async fn set_exercise_embedding(
    store: &Store,
    exercise_id: i32,
    embedding_json: String,
) -> Result<usize> {
    store
        .interact(move |conn| {
            diesel::update(exercises::table.find(exercise_id))
                .set(exercises::name_embedding.eq(Some(embedding_json)))
                .execute(conn)
                .map_err(Into::into)
        })
        .await
}

// Workouts

/// Starts a new in-progress workout. Any workout the profile still has in
/// progress is ended first; those are returned alongside the new one.
pub async fn create_workout(
    store: &Store,
    profile_id: i32,
    name: &str,
    location: &str,
) -> Result<(Workout, Vec<Workout>)> {
    let name = name.trim().to_string();
    let location = location.trim().to_string();
    store
        .interact(move |conn| {
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                let now = now_timestamp();
                let previous = workouts::table
                    .filter(workouts::profile_id.eq(profile_id))
                    .filter(workouts::in_progress.eq(true))
                    .select(Workout::as_select())
                    .load(conn)?;
                if !previous.is_empty() {
                    diesel::update(
                        workouts::table
                            .filter(workouts::profile_id.eq(profile_id))
                            .filter(workouts::in_progress.eq(true)),
                    )
                    .set((
                        workouts::ended_at.eq(Some(now)),
                        workouts::in_progress.eq(false),
                    ))
                    .execute(conn)?;
                }

                let workout = diesel::insert_into(workouts::table)
                    .values(&NewWorkout {
                        profile_id,
                        name,
                        location,
                        started_at: now,
                        ended_at: None,
                        in_progress: true,
                    })
                    .returning(Workout::as_returning())
                    .get_result(conn)?;
                Ok((workout, previous))
            })
        })
        .await
}

pub async fn get_workout(store: &Store, profile_id: i32, workout_id: i32) -> Result<Option<Workout>> {
    store
        .interact(move |conn| {
            workouts::table
                .filter(workouts::id.eq(workout_id))
                .filter(workouts::profile_id.eq(profile_id))
                .select(Workout::as_select())
                .first(conn)
                .optional()
                .map_err(Into::into)
        })
        .await
}

pub async fn get_in_progress_workout(store: &Store, profile_id: i32) -> Result<Option<Workout>> {
    store
        .interact(move |conn| {
            workouts::table
                .filter(workouts::profile_id.eq(profile_id))
                .filter(workouts::in_progress.eq(true))
                .order((workouts::started_at.desc(), workouts::id.desc()))
                .select(Workout::as_select())
                .first(conn)
                .optional()
                .map_err(Into::into)
        })
        .await
}

/// Every workout owned by the profile, newest first.
pub async fn get_all_workouts(store: &Store, profile_id: i32) -> Result<Vec<Workout>> {
    store
        .interact(move |conn| {
            workouts::table
                .filter(workouts::profile_id.eq(profile_id))
                .order((workouts::started_at.desc(), workouts::id.desc()))
                .select(Workout::as_select())
                .load(conn)
                .map_err(Into::into)
        })
        .await
}

pub async fn get_workout_detail(
    store: &Store,
    profile_id: i32,
    workout_id: i32,
) -> Result<Option<WorkoutDetail>> {
    store
        .interact(move |conn| {
            let Some(workout) = workouts::table
                .filter(workouts::id.eq(workout_id))
                .filter(workouts::profile_id.eq(profile_id))
                .select(Workout::as_select())
                .first(conn)
                .optional()?
            else {
                return Ok(None);
            };
            let sets = load_sets_with_names(conn, workout.id)?;
            Ok(Some(WorkoutDetail { workout, sets }))
        })
        .await
}

/// Ends the workout if it belongs to the profile and is still in progress.
/// Returns false (and changes nothing) otherwise.
pub async fn complete_workout(store: &Store, profile_id: i32, workout_id: i32) -> Result<bool> {
    store
        .interact(move |conn| {
            let updated = diesel::update(
                workouts::table
                    .filter(workouts::id.eq(workout_id))
                    .filter(workouts::profile_id.eq(profile_id))
                    .filter(workouts::in_progress.eq(true)),
            )
            .set((
                workouts::ended_at.eq(Some(now_timestamp())),
                workouts::in_progress.eq(false),
            ))
            .execute(conn)?;
            Ok(updated > 0)
        })
        .await
}

// Sets

fn load_sets_with_names(conn: &mut SqliteConnection, workout_id: i32) -> Result<Vec<DisplayableSet>> {
    let rows: Vec<(WorkoutSet, String)> = workout_sets::table
        .inner_join(exercises::table)
        .filter(workout_sets::workout_id.eq(workout_id))
        .order((workout_sets::created_at.asc(), workout_sets::id.asc()))
        .select((WorkoutSet::as_select(), exercises::name))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(set, name)| DisplayableSet::new(set, name))
        .collect())
}

pub async fn get_sets_for_workout(store: &Store, workout_id: i32) -> Result<Vec<DisplayableSet>> {
    store
        .interact(move |conn| load_sets_with_names(conn, workout_id))
        .await
}

/// Writes all sets in one transaction. The workout must be owned by the
/// profile and in progress, and every exercise must belong to the profile.
pub async fn save_sets(
    store: &Store,
    profile_id: i32,
    workout_id: i32,
    sets: Vec<SetInput>,
) -> Result<Vec<WorkoutSet>> {
    store
        .interact(move |conn| {
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                let in_progress = workouts::table
                    .filter(workouts::id.eq(workout_id))
                    .filter(workouts::profile_id.eq(profile_id))
                    .select(workouts::in_progress)
                    .first::<bool>(conn)
                    .optional()?;
                match in_progress {
                    None => bail!("Workout {} not found", workout_id),
                    Some(false) => bail!("Workout {} is not in progress", workout_id),
                    Some(true) => {}
                }

                let mut exercise_ids: Vec<i32> = sets.iter().map(|s| s.exercise_id).collect();
                exercise_ids.sort_unstable();
                exercise_ids.dedup();
                let owned: i64 = exercises::table
                    .filter(exercises::id.eq_any(exercise_ids.clone()))
                    .filter(exercises::profile_id.eq(profile_id))
                    .count()
                    .get_result(conn)?;
                if owned != exercise_ids.len() as i64 {
                    bail!("One or more exercises do not exist");
                }

                let now = now_timestamp();
                let mut saved = Vec::with_capacity(sets.len());
                for set in &sets {
                    let row = diesel::insert_into(workout_sets::table)
                        .values(&NewWorkoutSet {
                            workout_id,
                            exercise_id: set.exercise_id,
                            weight: set.weight,
                            reps: set.reps,
                            created_at: now,
                        })
                        .returning(WorkoutSet::as_returning())
                        .get_result(conn)?;
                    saved.push(row);
                }
                Ok(saved)
            })
        })
        .await
}

/// Deletes a set if it belongs to one of the profile's workouts.
pub async fn delete_set(store: &Store, profile_id: i32, set_id: i32) -> Result<usize> {
    store
        .interact(move |conn| {
            let owned = workout_sets::table
                .inner_join(workouts::table)
                .filter(workout_sets::id.eq(set_id))
                .filter(workouts::profile_id.eq(profile_id))
                .select(workout_sets::id)
                .first::<i32>(conn)
                .optional()?;
            match owned {
                Some(id) => diesel::delete(workout_sets::table.find(id))
                    .execute(conn)
                    .map_err(Into::into),
                None => Ok(0),
            }
        })
        .await
}

// Schedules

fn load_schedule_detail(conn: &mut SqliteConnection, schedule: Schedule) -> Result<ScheduleDayDetail> {
    let entries: Vec<(ScheduleEntry, String)> = schedule_entries::table
        .inner_join(exercises::table)
        .filter(schedule_entries::schedule_id.eq(schedule.id))
        .order((schedule_entries::sort_order.asc(), schedule_entries::id.asc()))
        .select((ScheduleEntry::as_select(), exercises::name))
        .load(conn)?;
    Ok(ScheduleDayDetail { schedule, entries })
}

fn find_schedule(conn: &mut SqliteConnection, profile_id: i32, schedule_id: i32) -> Result<Schedule> {
    schedules::table
        .filter(schedules::id.eq(schedule_id))
        .filter(schedules::profile_id.eq(profile_id))
        .select(Schedule::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| anyhow!("Schedule {} not found", schedule_id))
}

pub async fn get_schedule_day(
    store: &Store,
    profile_id: i32,
    day: i32,
) -> Result<Option<ScheduleDayDetail>> {
    store
        .interact(move |conn| {
            let schedule = schedules::table
                .filter(schedules::profile_id.eq(profile_id))
                .filter(schedules::day.eq(day))
                .select(Schedule::as_select())
                .first(conn)
                .optional()?;
            schedule
                .map(|s| load_schedule_detail(conn, s))
                .transpose()
        })
        .await
}

pub async fn get_schedule_by_id(
    store: &Store,
    profile_id: i32,
    schedule_id: i32,
) -> Result<Option<ScheduleDayDetail>> {
    store
        .interact(move |conn| {
            let schedule = schedules::table
                .filter(schedules::id.eq(schedule_id))
                .filter(schedules::profile_id.eq(profile_id))
                .select(Schedule::as_select())
                .first(conn)
                .optional()?;
            schedule
                .map(|s| load_schedule_detail(conn, s))
                .transpose()
        })
        .await
}

/// Every configured day of the profile, ordered by day.
pub async fn get_schedule_overview(store: &Store, profile_id: i32) -> Result<Vec<ScheduleDayDetail>> {
    store
        .interact(move |conn| {
            let days = schedules::table
                .filter(schedules::profile_id.eq(profile_id))
                .order(schedules::day.asc())
                .select(Schedule::as_select())
                .load(conn)?;
            days.into_iter()
                .map(|s| load_schedule_detail(conn, s))
                .collect()
        })
        .await
}

pub async fn create_schedule_day(
    store: &Store,
    profile_id: i32,
    day: i32,
    name: &str,
) -> Result<Schedule> {
    if !(0..=6).contains(&day) {
        bail!("Day {} is out of range", day);
    }
    let name = name.trim().to_string();
    store
        .interact(move |conn| {
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                let taken = schedules::table
                    .filter(schedules::profile_id.eq(profile_id))
                    .filter(schedules::day.eq(day))
                    .select(schedules::id)
                    .first::<i32>(conn)
                    .optional()?;
                if taken.is_some() {
                    bail!("A schedule already exists for that day");
                }
                diesel::insert_into(schedules::table)
                    .values(&NewSchedule {
                        profile_id,
                        day,
                        name,
                    })
                    .returning(Schedule::as_returning())
                    .get_result(conn)
                    .map_err(Into::into)
            })
        })
        .await
}

pub async fn rename_schedule_day(
    store: &Store,
    profile_id: i32,
    schedule_id: i32,
    name: &str,
) -> Result<usize> {
    let name = name.trim().to_string();
    store
        .interact(move |conn| {
            diesel::update(
                schedules::table
                    .filter(schedules::id.eq(schedule_id))
                    .filter(schedules::profile_id.eq(profile_id)),
            )
            .set(schedules::name.eq(name))
            .execute(conn)
            .map_err(Into::into)
        })
        .await
}

/// Appends an exercise to the end of a schedule day.
pub async fn add_schedule_entry(
    store: &Store,
    profile_id: i32,
    schedule_id: i32,
    exercise_id: i32,
) -> Result<ScheduleEntry> {
    store
        .interact(move |conn| {
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                let schedule = find_schedule(conn, profile_id, schedule_id)?;
                let owned: i64 = exercises::table
                    .filter(exercises::id.eq(exercise_id))
                    .filter(exercises::profile_id.eq(profile_id))
                    .count()
                    .get_result(conn)?;
                if owned == 0 {
                    bail!("Exercise {} not found", exercise_id);
                }
                let max_order: Option<i32> = schedule_entries::table
                    .filter(schedule_entries::schedule_id.eq(schedule.id))
                    .select(diesel::dsl::max(schedule_entries::sort_order))
                    .first(conn)?;
                diesel::insert_into(schedule_entries::table)
                    .values(&NewScheduleEntry {
                        schedule_id: schedule.id,
                        exercise_id,
                        sort_order: max_order.map_or(0, |m| m + 1),
                    })
                    .returning(ScheduleEntry::as_returning())
                    .get_result(conn)
                    .map_err(Into::into)
            })
        })
        .await
}

pub async fn remove_schedule_entry(
    store: &Store,
    profile_id: i32,
    schedule_id: i32,
    entry_id: i32,
) -> Result<usize> {
    store
        .interact(move |conn| {
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                let schedule = find_schedule(conn, profile_id, schedule_id)?;
                diesel::delete(
                    schedule_entries::table
                        .filter(schedule_entries::id.eq(entry_id))
                        .filter(schedule_entries::schedule_id.eq(schedule.id)),
                )
                .execute(conn)
                .map_err(Into::into)
            })
        })
        .await
}

/// Exchanges the `sort_order` values of two entries of the same day.
pub async fn swap_schedule_entries(
    store: &Store,
    profile_id: i32,
    schedule_id: i32,
    first_id: i32,
    second_id: i32,
) -> Result<()> {
    store
        .interact(move |conn| {
            conn.transaction::<_, anyhow::Error, _>(|conn| {
                let schedule = find_schedule(conn, profile_id, schedule_id)?;
                let entries: Vec<ScheduleEntry> = schedule_entries::table
                    .filter(schedule_entries::schedule_id.eq(schedule.id))
                    .filter(schedule_entries::id.eq_any(vec![first_id, second_id]))
                    .select(ScheduleEntry::as_select())
                    .load(conn)?;
                let find = |id: i32| {
                    entries
                        .iter()
                        .find(|e| e.id == id)
                        .ok_or_else(|| anyhow!("Schedule entry {} not found", id))
                };
                let first = find(first_id)?;
                let second = find(second_id)?;

                diesel::update(schedule_entries::table.find(first.id))
                    .set(schedule_entries::sort_order.eq(second.sort_order))
                    .execute(conn)?;
                diesel::update(schedule_entries::table.find(second.id))
                    .set(schedule_entries::sort_order.eq(first.sort_order))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Store, i32) {
        let store = Store::open_in_memory().unwrap();
        let (profile, _) = get_or_create_profile(&store, "alice", "member", &[]).await.unwrap();
        (store, profile.id)
    }

    #[tokio::test]
    async fn profile_lookup_is_idempotent() {
        let (store, id) = setup().await;
        let (again, created) = get_or_create_profile(&store, "alice", "admin", &[]).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, id);
        assert_eq!(again.role, "member");
    }

    #[tokio::test]
    async fn creating_a_workout_ends_the_previous_one() {
        let (store, profile) = setup().await;
        let (first, ended) = create_workout(&store, profile, "Push", "Gym").await.unwrap();
        assert!(ended.is_empty());
        let (second, ended) = create_workout(&store, profile, "Push", "Gym").await.unwrap();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].id, first.id);
        assert_ne!(first.id, second.id);

        let current = get_in_progress_workout(&store, profile).await.unwrap().unwrap();
        assert_eq!(current.id, second.id);
        let first = get_workout(&store, profile, first.id).await.unwrap().unwrap();
        assert!(!first.in_progress);
        assert!(first.ended_at.is_some());
    }

    #[tokio::test]
    async fn complete_workout_only_touches_in_progress_workouts() {
        let (store, profile) = setup().await;
        let (workout, _) = create_workout(&store, profile, "Legs", "").await.unwrap();
        assert!(complete_workout(&store, profile, workout.id).await.unwrap());
        assert!(!complete_workout(&store, profile, workout.id).await.unwrap());
        assert!(get_in_progress_workout(&store, profile).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn saved_sets_show_up_in_the_detail() {
        let (store, profile) = setup().await;
        let (bench, _) = get_or_create_exercise(&store, profile, "Bench Press", None).await.unwrap();
        let (workout, _) = create_workout(&store, profile, "Push", "").await.unwrap();
        let input = vec![
            SetInput { exercise_id: bench.id, weight: 135.0, reps: 5 },
            SetInput { exercise_id: bench.id, weight: 145.0, reps: 3 },
        ];
        let saved = save_sets(&store, profile, workout.id, input).await.unwrap();
        assert_eq!(saved.len(), 2);

        let detail = get_workout_detail(&store, profile, workout.id).await.unwrap().unwrap();
        assert_eq!(detail.sets.len(), 2);
        assert_eq!(detail.sets[0].exercise_name, "Bench Press");
        assert_eq!(detail.sets[1].set.reps, 3);
    }

    #[tokio::test]
    async fn sets_cannot_be_saved_to_a_finished_workout() {
        let (store, profile) = setup().await;
        let (squat, _) = get_or_create_exercise(&store, profile, "Squat", None).await.unwrap();
        let (workout, _) = create_workout(&store, profile, "Legs", "").await.unwrap();
        complete_workout(&store, profile, workout.id).await.unwrap();
        let input = vec![SetInput { exercise_id: squat.id, weight: 225.0, reps: 5 }];
        assert!(save_sets(&store, profile, workout.id, input).await.is_err());
        assert!(get_sets_for_workout(&store, workout.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_set_checks_ownership() {
        let (store, profile) = setup().await;
        let (other, _) = get_or_create_profile(&store, "mallory", "member", &[]).await.unwrap();
        let (squat, _) = get_or_create_exercise(&store, profile, "Squat", None).await.unwrap();
        let (workout, _) = create_workout(&store, profile, "Legs", "").await.unwrap();
        let saved = save_sets(
            &store,
            profile,
            workout.id,
            vec![SetInput { exercise_id: squat.id, weight: 225.0, reps: 5 }],
        )
        .await
        .unwrap();

        assert_eq!(delete_set(&store, other.id, saved[0].id).await.unwrap(), 0);
        assert_eq!(delete_set(&store, profile, saved[0].id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn exercises_are_matched_case_insensitively() {
        let (store, profile) = setup().await;
        let (first, created) = get_or_create_exercise(&store, profile, "Deadlift", None).await.unwrap();
        assert!(created);
        let (second, created) = get_or_create_exercise(&store, profile, " deadlift ", None).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn schedule_entries_append_and_swap() {
        let (store, profile) = setup().await;
        let schedule = create_schedule_day(&store, profile, 1, "Push day").await.unwrap();
        assert!(create_schedule_day(&store, profile, 1, "Again").await.is_err());

        let mut entries = Vec::new();
        for name in ["Bench Press", "Squat", "Deadlift"] {
            let (exercise, _) = get_or_create_exercise(&store, profile, name, None).await.unwrap();
            entries.push(add_schedule_entry(&store, profile, schedule.id, exercise.id).await.unwrap());
        }
        let orders: Vec<i32> = entries.iter().map(|e| e.sort_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);

        swap_schedule_entries(&store, profile, schedule.id, entries[0].id, entries[1].id)
            .await
            .unwrap();
        let detail = get_schedule_day(&store, profile, 1).await.unwrap().unwrap();
        let names: Vec<&str> = detail.entries.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(names, vec!["Squat", "Bench Press", "Deadlift"]);
        assert_eq!(detail.entries[2].0.sort_order, 2);
    }

    #[tokio::test]
    async fn new_profiles_are_seeded_in_the_same_transaction() {
        let store = Store::open_in_memory().unwrap();
        let seeds = vec!["Squat".to_string(), "squat".into(), "Deadlift".into()];
        let (profile, created) = get_or_create_profile(&store, "bo", "member", &seeds).await.unwrap();
        assert!(created);
        let names: Vec<String> = get_exercises_for_profile(&store, profile.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Deadlift", "Squat"]);

        let (_, created) = get_or_create_profile(&store, "bo", "member", &seeds).await.unwrap();
        assert!(!created);
        assert_eq!(get_exercises_for_profile(&store, profile.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn a_failed_seed_leaves_no_profile_behind() {
        let store = Store::open_in_memory().unwrap();
        let bad = vec!["Squat".to_string(), "  ".into()];
        assert!(get_or_create_profile(&store, "cy", "member", &bad).await.is_err());

        let good = vec!["Squat".to_string(), "Bench Press".into()];
        let (profile, created) = get_or_create_profile(&store, "cy", "member", &good).await.unwrap();
        assert!(created);
        assert_eq!(get_exercises_for_profile(&store, profile.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn schedule_entries_need_an_owned_exercise() {
        let (store, profile) = setup().await;
        let (other, _) = get_or_create_profile(&store, "mallory", "member", &[]).await.unwrap();
        let (foreign, _) = get_or_create_exercise(&store, other.id, "Squat", None).await.unwrap();
        let schedule = create_schedule_day(&store, profile, 2, "Legs").await.unwrap();

        assert!(add_schedule_entry(&store, profile, schedule.id, foreign.id).await.is_err());
        let detail = get_schedule_by_id(&store, profile, schedule.id).await.unwrap().unwrap();
        assert!(detail.entries.is_empty());
    }
}
