use chrono::{DateTime, Utc};
use diesel::{Identifiable, Insertable, Queryable, Selectable};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::schema;

pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

pub fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

// Profile models
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = schema::profiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProfileRow {
    pub id: i32,
    pub username: String,
    pub role: String,
    pub created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = schema::profiles)]
pub struct NewProfile {
    pub username: String,
    pub role: String,
    pub created_at: i64,
}

// Exercise models
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = schema::exercises)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Exercise {
    pub id: i32,
    pub profile_id: i32,
    pub name: String,
    pub name_embedding: Option<String>,
    pub created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = schema::exercises)]
pub struct NewExercise {
    pub profile_id: i32,
    pub name: String,
    pub name_embedding: Option<String>,
    pub created_at: i64,
}

// Workout models
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = schema::workouts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Workout {
    pub id: i32,
    pub profile_id: i32,
    pub name: String,
    pub location: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub in_progress: bool,
}

impl Workout {
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("Workout #{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::workouts)]
pub struct NewWorkout {
    pub profile_id: i32,
    pub name: String,
    pub location: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub in_progress: bool,
}

// Set models
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = schema::workout_sets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct WorkoutSet {
    pub id: i32,
    pub workout_id: i32,
    pub exercise_id: i32,
    pub weight: f64,
    pub reps: i32,
    pub created_at: i64,
}

// Helper struct for displaying sets with exercise names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayableSet {
    pub set: WorkoutSet,
    pub exercise_name: String,
}

impl DisplayableSet {
    pub fn new(set: WorkoutSet, exercise_name: String) -> Self {
        Self { set, exercise_name }
    }
}

impl fmt::Display for DisplayableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.1}lbs x {} reps",
            self.exercise_name, self.set.weight, self.set.reps
        )
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::workout_sets)]
pub struct NewWorkoutSet {
    pub workout_id: i32,
    pub exercise_id: i32,
    pub weight: f64,
    pub reps: i32,
    pub created_at: i64,
}

// Schedule models
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = schema::schedules)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Schedule {
    pub id: i32,
    pub profile_id: i32,
    pub day: i32,
    pub name: String,
}

#[derive(Insertable)]
#[diesel(table_name = schema::schedules)]
pub struct NewSchedule {
    pub profile_id: i32,
    pub day: i32,
    pub name: String,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = schema::schedule_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ScheduleEntry {
    pub id: i32,
    pub schedule_id: i32,
    pub exercise_id: i32,
    pub sort_order: i32,
}

#[derive(Insertable)]
#[diesel(table_name = schema::schedule_entries)]
pub struct NewScheduleEntry {
    pub schedule_id: i32,
    pub exercise_id: i32,
    pub sort_order: i32,
}

/// A workout together with its sets, each paired with its exercise name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDetail {
    pub workout: Workout,
    pub sets: Vec<DisplayableSet>,
}

impl WorkoutDetail {
    /// Sets grouped by exercise, groups in order of first appearance.
    pub fn grouped_by_exercise(&self) -> Vec<(String, Vec<&DisplayableSet>)> {
        let mut groups: Vec<(String, Vec<&DisplayableSet>)> = Vec::new();
        for set in &self.sets {
            match groups
                .iter_mut()
                .find(|(name, _)| *name == set.exercise_name)
            {
                Some((_, sets)) => sets.push(set),
                None => groups.push((set.exercise_name.clone(), vec![set])),
            }
        }
        groups
    }
}

/// One schedule day with its entries, sorted by `sort_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDayDetail {
    pub schedule: Schedule,
    pub entries: Vec<(ScheduleEntry, String)>,
}
