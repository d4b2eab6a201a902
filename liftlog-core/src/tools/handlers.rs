use anyhow::Result;
use futures::future::try_join_all;
use log::{debug, info, warn};

use super::{SetRequest, ToolCall, ToolKind};
use crate::auth::Profile;
use crate::db::Store;
use crate::db::operations;
use crate::error::LiftlogError;
use crate::llm::ToolInvocation;
use crate::schedule::Weekday;
use crate::search::ExerciseSearch;
use crate::session::Message;
use crate::ui::{Fragment, ScheduleSlot, SetDraft, UiSink};

pub const NO_ACTIVE_WORKOUT: &str = "No currently active workout...";

/// Everything a handler may touch for one call.
pub struct ToolContext<'a> {
    pub store: &'a Store,
    pub search: &'a ExerciseSearch,
    pub profile: &'a Profile,
    /// Weekday used by `get_todays_schedule`.
    pub today: Weekday,
}

/// What one tool call produced: the fragment to show and the single function
/// message to append to the history.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub fragment: Fragment,
    pub message: Message,
}

struct ToolOutput {
    fragment: Fragment,
    summary: String,
}

impl ToolOutput {
    fn new(fragment: Fragment, summary: impl Into<String>) -> Self {
        Self {
            fragment,
            summary: summary.into(),
        }
    }
}

/// Validates the invocation, runs its handler and turns every failure into a
/// visible fragment plus a diagnostic function message.
pub async fn dispatch(ctx: &ToolContext<'_>, invocation: &ToolInvocation, sink: &UiSink) -> Dispatched {
    debug!(
        "dispatch called tool={} arguments_len={}",
        invocation.name,
        invocation.arguments.len()
    );
    let call = match ToolCall::parse(invocation) {
        Ok(call) => call,
        Err(err) => {
            warn!("Rejected tool call {}: {}", invocation.name, err);
            let text = match &err {
                LiftlogError::UnknownTool(_) => {
                    "I can't help with that yet, try asking a different question.".to_string()
                }
                LiftlogError::InvalidArguments { reason, .. } => format!(
                    "I couldn't understand the details of that request ({}). Could you rephrase it?",
                    reason
                ),
                other => other.to_string(),
            };
            return Dispatched {
                fragment: Fragment::system(text),
                message: Message::function(invocation.name.clone(), format!("rejected: {}", err)),
            };
        }
    };

    let kind = call.kind();
    match run(ctx, call, sink).await {
        Ok(output) => {
            info!("Tool {} completed: {}", kind.name(), output.summary);
            Dispatched {
                fragment: output.fragment,
                message: Message::function(kind.name(), output.summary),
            }
        }
        Err(err) => {
            warn!("Tool {} failed: {:#}", kind.name(), err);
            Dispatched {
                fragment: Fragment::system(format!("Something went wrong: {}", err)),
                message: Message::function(kind.name(), format!("failed: {}", err)),
            }
        }
    }
}

async fn run(ctx: &ToolContext<'_>, call: ToolCall, sink: &UiSink) -> Result<ToolOutput> {
    match call {
        ToolCall::ViewCurrentWorkout => {
            sink.pending(Fragment::loading("Loading your current workout"));
            view_current_workout(ctx).await
        }
        ToolCall::AddSets { sets } => {
            sink.pending(Fragment::loading("Looking up your exercises"));
            add_sets(ctx, sets).await
        }
        ToolCall::ViewAllWorkouts => {
            sink.pending(Fragment::loading("Loading your workouts"));
            view_all_workouts(ctx).await
        }
        ToolCall::CompleteWorkout => {
            sink.pending(Fragment::loading("Loading your current workout"));
            complete_workout(ctx).await
        }
        ToolCall::CreateNewWorkout { name, location } => Ok(create_new_workout(name, location)),
        ToolCall::GetTodaysSchedule => {
            sink.pending(Fragment::loading("Loading today's schedule"));
            schedule_for_day(ctx, ctx.today, true).await
        }
        ToolCall::ViewScheduleDay { day } => {
            sink.pending(Fragment::loading(format!("Loading your {} schedule", day)));
            schedule_for_day(ctx, day, false).await
        }
        ToolCall::ManageSchedule => {
            sink.pending(Fragment::loading("Loading your schedule"));
            manage_schedule(ctx).await
        }
    }
}

async fn view_current_workout(ctx: &ToolContext<'_>) -> Result<ToolOutput> {
    let Some(workout) = operations::get_in_progress_workout(ctx.store, ctx.profile.id).await? else {
        return Ok(ToolOutput::new(
            Fragment::system(NO_ACTIVE_WORKOUT),
            "the user does not have a currently active workout",
        ));
    };
    let detail = operations::get_workout_detail(ctx.store, ctx.profile.id, workout.id)
        .await?
        .ok_or_else(|| LiftlogError::NotFound(format!("workout {}", workout.id)))?;
    Ok(ToolOutput::new(
        Fragment::with_notice(
            "Here is your current workout:",
            Fragment::WorkoutBreakdown { detail },
        ),
        "user has been given a card to view the status of their current workout",
    ))
}

async fn add_sets(ctx: &ToolContext<'_>, sets: Vec<SetRequest>) -> Result<ToolOutput> {
    let Some(workout) = operations::get_in_progress_workout(ctx.store, ctx.profile.id).await? else {
        return Ok(ToolOutput::new(
            Fragment::system(NO_ACTIVE_WORKOUT),
            "the user does not have a currently active workout, so sets cannot be added",
        ));
    };

    let lookups = sets
        .iter()
        .map(|set| ctx.search.best_match(&set.exercise, ctx.profile.id));
    let matches = try_join_all(lookups).await?;

    let missing: Vec<&str> = sets
        .iter()
        .zip(&matches)
        .filter(|(_, m)| m.is_none())
        .map(|(set, _)| set.exercise.as_str())
        .collect();
    if !missing.is_empty() {
        let names = missing
            .iter()
            .map(|n| format!("\"{}\"", n))
            .collect::<Vec<_>>()
            .join(", ");
        return Ok(ToolOutput::new(
            Fragment::system(format!(
                "I couldn't find that exercise ({}), please try again!",
                names
            )),
            format!("could not find exercise {}; no sets were drafted", names),
        ));
    }

    let rows: Vec<SetDraft> = sets
        .into_iter()
        .zip(matches.into_iter().flatten())
        .map(|(set, found)| SetDraft {
            exercise_id: found.id,
            exercise_name: found.name,
            reps: i32::try_from(set.reps).unwrap_or(i32::MAX),
            weight: set.weight,
        })
        .collect();
    let described = rows
        .iter()
        .map(|r| format!("{} {:.1}lbs x {}", r.exercise_name, r.weight, r.reps))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(ToolOutput::new(
        Fragment::with_notice(
            "Add your set here, once you are done go ahead and hit save!",
            Fragment::SetEntryForm {
                workout_id: workout.id,
                rows,
            },
        ),
        format!("provided the UI for the user to save these sets: {}", described),
    ))
}

async fn view_all_workouts(ctx: &ToolContext<'_>) -> Result<ToolOutput> {
    let workouts = operations::get_all_workouts(ctx.store, ctx.profile.id).await?;
    let summary = format!("showed the user a table of their {} workouts", workouts.len());
    Ok(ToolOutput::new(
        Fragment::with_notice(
            "Here are all of your workouts!",
            Fragment::WorkoutTable { workouts },
        ),
        summary,
    ))
}

async fn complete_workout(ctx: &ToolContext<'_>) -> Result<ToolOutput> {
    let Some(workout) = operations::get_in_progress_workout(ctx.store, ctx.profile.id).await? else {
        return Ok(ToolOutput::new(
            Fragment::system(NO_ACTIVE_WORKOUT),
            "the user does not have a currently active workout, so we cannot complete it",
        ));
    };
    Ok(ToolOutput::new(
        Fragment::with_notice(
            "Are you ready to finish your workout?",
            Fragment::CompleteWorkout { workout },
        ),
        "provided the UI for the user to complete their workout",
    ))
}

fn create_new_workout(name: Option<String>, location: Option<String>) -> ToolOutput {
    ToolOutput::new(
        Fragment::with_notice(
            "Lets get your workout info ready, once you submit, your workout will automatically start!",
            Fragment::CreateWorkoutForm { name, location },
        ),
        "provided the UI for the user to create a new workout",
    )
}

async fn schedule_for_day(ctx: &ToolContext<'_>, day: Weekday, is_today: bool) -> Result<ToolOutput> {
    let label = if is_today {
        "today".to_string()
    } else {
        day.to_string()
    };
    let schedule = operations::get_schedule_day(ctx.store, ctx.profile.id, day.index()).await?;
    let Some(schedule) = schedule else {
        return Ok(ToolOutput::new(
            Fragment::system(format!("No schedule found for {}...", label)),
            format!("the user has no schedule for {}", label),
        ));
    };
    let exercises = schedule
        .entries
        .iter()
        .map(|(_, name)| name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let summary = format!(
        "showed the user their {} schedule \"{}\": {}",
        day, schedule.schedule.name, exercises
    );
    Ok(ToolOutput::new(
        Fragment::with_notice(
            format!("Here is your schedule for {}:", label),
            Fragment::DaySchedule { day, schedule },
        ),
        summary,
    ))
}

/// One slot per weekday, Sunday first, empty where nothing is configured.
pub(crate) async fn schedule_slots(store: &Store, profile_id: i32) -> Result<Vec<ScheduleSlot>> {
    let mut configured = operations::get_schedule_overview(store, profile_id).await?;
    Ok(Weekday::ALL
        .into_iter()
        .map(|day| {
            let schedule = configured
                .iter()
                .position(|d| d.schedule.day == day.index())
                .map(|i| configured.swap_remove(i));
            ScheduleSlot { day, schedule }
        })
        .collect())
}

async fn manage_schedule(ctx: &ToolContext<'_>) -> Result<ToolOutput> {
    let days = schedule_slots(ctx.store, ctx.profile.id).await?;
    Ok(ToolOutput::new(
        Fragment::with_notice(
            "You can set which exercises you want to do on each day of the week, and how many sets you want to do for each exercise.",
            Fragment::ScheduleManager { days },
        ),
        "provided the UI for the user to manage their weekly schedule",
    ))
}
