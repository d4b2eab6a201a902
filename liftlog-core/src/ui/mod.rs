//! Renderable UI fragments and the update stream that carries them.
//!
//! A handler sends any number of [`UiUpdate::Pending`] fragments followed by
//! exactly one [`UiUpdate::Resolved`]. [`UiSink::resolve`] consumes the sink,
//! so a second terminal update cannot be expressed.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::db::models::{ScheduleDayDetail, Workout, WorkoutDetail, format_timestamp};
use crate::schedule::Weekday;

/// One editable row of the set-entry form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetDraft {
    pub exercise_id: i32,
    pub exercise_name: String,
    pub reps: i32,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub day: Weekday,
    pub schedule: Option<ScheduleDayDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fragment {
    /// Echo of what the user typed; added by the front end.
    User { text: String },
    /// Text written by the model.
    Assistant { text: String },
    /// Notices, clarifications and diagnostics.
    System { text: String },
    Loading { label: String },
    /// Fragments shown together, top to bottom.
    Stack { children: Vec<Fragment> },
    WorkoutBreakdown { detail: WorkoutDetail },
    SetEntryForm { workout_id: i32, rows: Vec<SetDraft> },
    WorkoutTable { workouts: Vec<Workout> },
    CompleteWorkout { workout: Workout },
    CreateWorkoutForm {
        name: Option<String>,
        location: Option<String>,
    },
    DaySchedule {
        day: Weekday,
        schedule: ScheduleDayDetail,
    },
    ScheduleManager { days: Vec<ScheduleSlot> },
}

impl Fragment {
    pub fn user(text: impl Into<String>) -> Self {
        Fragment::User { text: text.into() }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Fragment::System { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Fragment::Assistant { text: text.into() }
    }

    pub fn loading(label: impl Into<String>) -> Self {
        Fragment::Loading {
            label: label.into(),
        }
    }

    /// A notice followed by an interactive card.
    pub fn with_notice(text: impl Into<String>, card: Fragment) -> Self {
        Fragment::Stack {
            children: vec![Fragment::system(text), card],
        }
    }

    /// Every fragment in depth-first order, this one included.
    pub fn walk(&self) -> Vec<&Fragment> {
        let mut out = vec![self];
        if let Fragment::Stack { children } = self {
            for child in children {
                out.extend(child.walk());
            }
        }
        out
    }

    /// Concatenated text of the system and assistant messages in the fragment.
    pub fn text(&self) -> String {
        self.walk()
            .into_iter()
            .filter_map(|f| match f {
                Fragment::System { text } | Fragment::Assistant { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::User { text } => write!(f, "> {}", text),
            Fragment::Assistant { text } | Fragment::System { text } => write!(f, "{}", text),
            Fragment::Loading { label } => write!(f, "{}...", label),
            Fragment::Stack { children } => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", child)?;
                }
                Ok(())
            }
            Fragment::WorkoutBreakdown { detail } => {
                write!(f, "[{}]", detail.workout.display_name())?;
                if !detail.workout.location.is_empty() {
                    write!(f, " @ {}", detail.workout.location)?;
                }
                if detail.sets.is_empty() {
                    write!(f, "\n  no sets yet")?;
                }
                for (exercise, sets) in detail.grouped_by_exercise() {
                    write!(f, "\n  {}", exercise)?;
                    for set in sets {
                        write!(
                            f,
                            "\n    #{} {:.1}lbs x {}",
                            set.set.id, set.set.weight, set.set.reps
                        )?;
                    }
                }
                Ok(())
            }
            Fragment::SetEntryForm { workout_id, rows } => {
                write!(f, "[new sets for workout #{}]", workout_id)?;
                for row in rows {
                    write!(
                        f,
                        "\n  {}: {:.1}lbs x {}",
                        row.exercise_name, row.weight, row.reps
                    )?;
                }
                Ok(())
            }
            Fragment::WorkoutTable { workouts } => {
                write!(f, "{:<6} {:<20} {:<16} {:<16} {}", "id", "name", "started", "ended", "location")?;
                for w in workouts {
                    let ended = match (w.in_progress, w.ended_at) {
                        (true, _) => "in progress".to_string(),
                        (false, Some(ts)) => format_timestamp(ts),
                        (false, None) => "-".to_string(),
                    };
                    write!(
                        f,
                        "\n{:<6} {:<20} {:<16} {:<16} {}",
                        w.id,
                        w.display_name(),
                        format_timestamp(w.started_at),
                        ended,
                        w.location
                    )?;
                }
                Ok(())
            }
            Fragment::CompleteWorkout { workout } => {
                write!(f, "[finish {}? /finish {}]", workout.display_name(), workout.id)
            }
            Fragment::CreateWorkoutForm { name, location } => write!(
                f,
                "[new workout: name={:?} location={:?}]",
                name.as_deref().unwrap_or(""),
                location.as_deref().unwrap_or("")
            ),
            Fragment::DaySchedule { day, schedule } => {
                write!(f, "{}: {}", day, schedule.schedule.name)?;
                for (i, (_, exercise)) in schedule.entries.iter().enumerate() {
                    write!(f, "\n  {}. {}", i + 1, exercise)?;
                }
                Ok(())
            }
            Fragment::ScheduleManager { days } => {
                for (i, slot) in days.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    match &slot.schedule {
                        Some(detail) => {
                            write!(f, "{} (#{}): {}", slot.day, detail.schedule.id, detail.schedule.name)?;
                            for (entry, exercise) in &detail.entries {
                                write!(f, "\n  [{}] {}", entry.id, exercise)?;
                            }
                        }
                        None => write!(f, "{}: rest", slot.day)?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Front-end views that must be refetched after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKey {
    CurrentWorkout,
    ActiveWorkout,
}

/// Result of a fragment action: what to show, and which views went stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub fragment: Fragment,
    pub invalidate: Vec<ViewKey>,
}

impl ActionOutcome {
    pub fn new(fragment: Fragment) -> Self {
        Self {
            fragment,
            invalidate: Vec::new(),
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::new(Fragment::system(text))
    }

    pub fn invalidating(mut self, keys: &[ViewKey]) -> Self {
        self.invalidate.extend_from_slice(keys);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Pending(Fragment),
    Resolved(Fragment),
}

/// Producer half of a UI update stream.
#[derive(Debug)]
pub struct UiSink {
    tx: mpsc::UnboundedSender<UiUpdate>,
}

/// Consumer half of a UI update stream. There is exactly one per sink.
#[derive(Debug)]
pub struct UiStream {
    rx: mpsc::UnboundedReceiver<UiUpdate>,
}

pub fn ui_channel() -> (UiSink, UiStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiSink { tx }, UiStream { rx })
}

impl UiSink {
    /// A sink whose updates go nowhere.
    pub fn detached() -> Self {
        ui_channel().0
    }

    pub fn pending(&self, fragment: Fragment) {
        if self.tx.send(UiUpdate::Pending(fragment)).is_err() {
            debug!("UI stream closed, dropping pending fragment");
        }
    }

    pub fn resolve(self, fragment: Fragment) {
        if self.tx.send(UiUpdate::Resolved(fragment)).is_err() {
            debug!("UI stream closed, dropping resolved fragment");
        }
    }
}

impl UiStream {
    pub async fn next(&mut self) -> Option<UiUpdate> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<UiUpdate> {
        self.rx.try_recv().ok()
    }

    /// Drains the stream and returns the resolved fragment, if any.
    pub async fn resolved(mut self) -> Option<Fragment> {
        while let Some(update) = self.next().await {
            if let UiUpdate::Resolved(fragment) = update {
                return Some(fragment);
            }
        }
        None
    }
}
