//! The closed set of tools the model can call.
//!
//! Each [`ToolKind`] carries its name, description and argument schema. A raw
//! [`ToolInvocation`] from the model is turned into a typed [`ToolCall`] by
//! [`ToolCall::parse`], which also checks ranges and required fields. Handlers
//! are chosen by kind, never by the description text.

mod handlers;

pub use handlers::{Dispatched, NO_ACTIVE_WORKOUT, ToolContext, dispatch};
pub(crate) use handlers::schedule_slots;

use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::LazyLock;

use crate::error::LiftlogError;
use crate::llm::{ToolInvocation, ToolSpec, strip_code_fences};
use crate::schedule::Weekday;

pub const MAX_REPS: i64 = 1000;
pub const MAX_WEIGHT: f64 = 5000.0;
pub const MAX_SETS_PER_CALL: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ViewCurrentWorkout,
    AddSets,
    ViewAllWorkouts,
    CompleteWorkout,
    CreateNewWorkout,
    GetTodaysSchedule,
    ViewScheduleDay,
    ManageSchedule,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::ViewCurrentWorkout,
        ToolKind::AddSets,
        ToolKind::ViewAllWorkouts,
        ToolKind::CompleteWorkout,
        ToolKind::CreateNewWorkout,
        ToolKind::GetTodaysSchedule,
        ToolKind::ViewScheduleDay,
        ToolKind::ManageSchedule,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ViewCurrentWorkout => "view_current_workout",
            ToolKind::AddSets => "add_sets",
            ToolKind::ViewAllWorkouts => "view_all_workouts",
            ToolKind::CompleteWorkout => "complete_workout",
            ToolKind::CreateNewWorkout => "create_new_workout",
            ToolKind::GetTodaysSchedule => "get_todays_schedule",
            ToolKind::ViewScheduleDay => "view_schedule_day",
            ToolKind::ManageSchedule => "manage_schedule",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::ViewCurrentWorkout => {
                "Show the user's current in-progress workout with the sets recorded so far."
            }
            ToolKind::AddSets => {
                "Record one or more sets in the current workout. Each set has an exercise name, a number of reps and a weight in pounds."
            }
            ToolKind::ViewAllWorkouts => "Show every workout the user has logged.",
            ToolKind::CompleteWorkout => "Finish the user's current workout.",
            ToolKind::CreateNewWorkout => {
                "Start a new workout, optionally with a name and a location."
            }
            ToolKind::GetTodaysSchedule => {
                "Show the exercises the user has scheduled for today."
            }
            ToolKind::ViewScheduleDay => {
                "Show the exercises the user has scheduled for a given day of the week."
            }
            ToolKind::ManageSchedule => {
                "Let the user edit which exercises they do on each day of the week."
            }
        }
    }

    pub fn parameters(self) -> Value {
        let empty = json!({ "type": "object", "properties": {} });
        match self {
            ToolKind::AddSets => json!({
                "type": "object",
                "properties": {
                    "sets": {
                        "type": "array",
                        "minItems": 1,
                        "maxItems": MAX_SETS_PER_CALL,
                        "items": {
                            "type": "object",
                            "properties": {
                                "exercise": {
                                    "type": "string",
                                    "description": "Name of the exercise, e.g. bench press"
                                },
                                "reps": { "type": "integer", "minimum": 1, "maximum": MAX_REPS },
                                "weight": {
                                    "type": "number",
                                    "minimum": 0,
                                    "maximum": MAX_WEIGHT,
                                    "description": "Weight in pounds"
                                }
                            },
                            "required": ["exercise", "reps", "weight"]
                        }
                    }
                },
                "required": ["sets"]
            }),
            ToolKind::CreateNewWorkout => json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Name of the workout, e.g. Push day" },
                    "location": { "type": "string", "description": "Where the workout happens" }
                }
            }),
            ToolKind::ViewScheduleDay => json!({
                "type": "object",
                "properties": {
                    "day": {
                        "type": "string",
                        "enum": Weekday::ALL.iter().map(|d| d.name().to_lowercase()).collect::<Vec<_>>()
                    }
                },
                "required": ["day"]
            }),
            _ => empty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub kind: ToolKind,
    pub spec: ToolSpec,
}

static REGISTRY: LazyLock<Vec<ToolDefinition>> = LazyLock::new(|| {
    ToolKind::ALL
        .into_iter()
        .map(|kind| ToolDefinition {
            kind,
            spec: ToolSpec {
                name: kind.name().to_string(),
                description: kind.description().to_string(),
                parameters: kind.parameters(),
            },
        })
        .collect()
});

/// Every tool offered to the model. Built once, never modified.
pub fn registry() -> &'static [ToolDefinition] {
    &REGISTRY
}

pub fn tool_specs() -> Vec<ToolSpec> {
    registry().iter().map(|t| t.spec.clone()).collect()
}

/// One set the model asked to record, before the exercise is resolved.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetRequest {
    pub exercise: String,
    pub reps: i64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ViewCurrentWorkout,
    AddSets { sets: Vec<SetRequest> },
    ViewAllWorkouts,
    CompleteWorkout,
    CreateNewWorkout {
        name: Option<String>,
        location: Option<String>,
    },
    GetTodaysSchedule,
    ViewScheduleDay { day: Weekday },
    ManageSchedule,
}

#[derive(Deserialize)]
struct AddSetsArgs {
    sets: Vec<SetRequest>,
}

#[derive(Deserialize)]
struct CreateWorkoutArgs {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Deserialize)]
struct ScheduleDayArgs {
    day: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ToolCall {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCall::ViewCurrentWorkout => ToolKind::ViewCurrentWorkout,
            ToolCall::AddSets { .. } => ToolKind::AddSets,
            ToolCall::ViewAllWorkouts => ToolKind::ViewAllWorkouts,
            ToolCall::CompleteWorkout => ToolKind::CompleteWorkout,
            ToolCall::CreateNewWorkout { .. } => ToolKind::CreateNewWorkout,
            ToolCall::GetTodaysSchedule => ToolKind::GetTodaysSchedule,
            ToolCall::ViewScheduleDay { .. } => ToolKind::ViewScheduleDay,
            ToolCall::ManageSchedule => ToolKind::ManageSchedule,
        }
    }

    /// Decodes and validates the model's arguments.
    pub fn parse(invocation: &ToolInvocation) -> Result<Self, LiftlogError> {
        let kind = ToolKind::from_name(invocation.name.trim())
            .ok_or_else(|| LiftlogError::UnknownTool(invocation.name.clone()))?;
        let raw = strip_code_fences(&invocation.arguments);
        let args: Value = if raw.is_empty() {
            json!({})
        } else {
            serde_json::from_str(raw)
                .map_err(|e| LiftlogError::invalid_arguments(kind.name(), format!("not valid JSON: {}", e)))?
        };
        if !args.is_object() {
            return Err(LiftlogError::invalid_arguments(
                kind.name(),
                "arguments must be a JSON object",
            ));
        }

        let decode = |e: serde_json::Error| LiftlogError::invalid_arguments(kind.name(), e.to_string());
        let call = match kind {
            ToolKind::ViewCurrentWorkout => ToolCall::ViewCurrentWorkout,
            ToolKind::ViewAllWorkouts => ToolCall::ViewAllWorkouts,
            ToolKind::CompleteWorkout => ToolCall::CompleteWorkout,
            ToolKind::GetTodaysSchedule => ToolCall::GetTodaysSchedule,
            ToolKind::ManageSchedule => ToolCall::ManageSchedule,
            ToolKind::AddSets => {
                let parsed: AddSetsArgs = serde_json::from_value(args).map_err(decode)?;
                ToolCall::AddSets {
                    sets: validate_sets(parsed.sets)?,
                }
            }
            ToolKind::CreateNewWorkout => {
                let parsed: CreateWorkoutArgs = serde_json::from_value(args).map_err(decode)?;
                ToolCall::CreateNewWorkout {
                    name: non_blank(parsed.name),
                    location: non_blank(parsed.location),
                }
            }
            ToolKind::ViewScheduleDay => {
                let parsed: ScheduleDayArgs = serde_json::from_value(args).map_err(decode)?;
                let day = parsed
                    .day
                    .parse::<Weekday>()
                    .map_err(|e| LiftlogError::invalid_arguments(kind.name(), e))?;
                ToolCall::ViewScheduleDay { day }
            }
        };
        Ok(call)
    }
}

fn validate_sets(sets: Vec<SetRequest>) -> Result<Vec<SetRequest>, LiftlogError> {
    let tool = ToolKind::AddSets.name();
    if sets.is_empty() {
        return Err(LiftlogError::invalid_arguments(tool, "at least one set is required"));
    }
    if sets.len() > MAX_SETS_PER_CALL {
        return Err(LiftlogError::invalid_arguments(
            tool,
            format!("at most {} sets can be added at once", MAX_SETS_PER_CALL),
        ));
    }
    sets.into_iter()
        .map(|mut set| {
            set.exercise = set.exercise.trim().to_string();
            if set.exercise.is_empty() {
                return Err(LiftlogError::invalid_arguments(tool, "exercise name is empty"));
            }
            if !(1..=MAX_REPS).contains(&set.reps) {
                return Err(LiftlogError::invalid_arguments(
                    tool,
                    format!("reps must be between 1 and {}, got {}", MAX_REPS, set.reps),
                ));
            }
            if !set.weight.is_finite() || !(0.0..=MAX_WEIGHT).contains(&set.weight) {
                return Err(LiftlogError::invalid_arguments(
                    tool,
                    format!("weight must be between 0 and {}, got {}", MAX_WEIGHT, set.weight),
                ));
            }
            Ok(set)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: &str) -> Result<ToolCall, LiftlogError> {
        ToolCall::parse(&ToolInvocation {
            name: name.into(),
            arguments: arguments.into(),
        })
    }

    #[test]
    fn registry_covers_every_kind_once() {
        assert_eq!(registry().len(), ToolKind::ALL.len());
        for def in registry() {
            assert_eq!(ToolKind::from_name(&def.spec.name), Some(def.kind));
            assert_eq!(def.spec.parameters["type"], "object");
        }
    }

    #[test]
    fn add_sets_arguments_are_typed() {
        let parsed = call(
            "add_sets",
            r#"{"sets":[{"exercise":" bench ","reps":5,"weight":135}]}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            ToolCall::AddSets {
                sets: vec![SetRequest {
                    exercise: "bench".into(),
                    reps: 5,
                    weight: 135.0
                }]
            }
        );
    }

    #[test]
    fn out_of_range_sets_are_rejected() {
        for args in [
            r#"{"sets":[{"exercise":"bench","reps":0,"weight":135}]}"#,
            r#"{"sets":[{"exercise":"bench","reps":5,"weight":-10}]}"#,
            r#"{"sets":[{"exercise":"","reps":5,"weight":10}]}"#,
            r#"{"sets":[{"exercise":"bench","reps":"five","weight":10}]}"#,
            r#"{"sets":[]}"#,
            r#"{}"#,
        ] {
            assert!(
                matches!(call("add_sets", args), Err(LiftlogError::InvalidArguments { .. })),
                "accepted {args}"
            );
        }
    }

    #[test]
    fn unknown_tools_are_reported_by_name() {
        assert!(matches!(call("rsc_demo", "{}"), Err(LiftlogError::UnknownTool(n)) if n == "rsc_demo"));
    }

    #[test]
    fn empty_or_fenced_arguments_are_accepted() {
        assert_eq!(call("view_all_workouts", "").unwrap(), ToolCall::ViewAllWorkouts);
        assert_eq!(
            call("create_new_workout", "```json\n{\"name\":\"Legs\",\"location\":\" \"}\n```").unwrap(),
            ToolCall::CreateNewWorkout {
                name: Some("Legs".into()),
                location: None
            }
        );
    }

    #[test]
    fn schedule_day_must_be_a_weekday() {
        assert_eq!(
            call("view_schedule_day", r#"{"day":"friday"}"#).unwrap(),
            ToolCall::ViewScheduleDay {
                day: Weekday::Friday
            }
        );
        assert!(call("view_schedule_day", r#"{"day":"someday"}"#).is_err());
        assert!(call("view_schedule_day", "[1,2]").is_err());
    }
}
