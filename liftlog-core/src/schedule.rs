//! Weekday handling and schedule reordering rules.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::models::ScheduleEntry;

/// Day of the week, numbered from Sunday = 0 as stored in `schedules.day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Sunday,
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    pub fn index(self) -> i32 {
        self as i32
    }

    pub fn from_index(day: i32) -> Option<Self> {
        usize::try_from(day).ok().and_then(|d| Self::ALL.get(d).copied())
    }

    pub fn name(self) -> &'static str {
        match self {
            Weekday::Sunday => "Sunday",
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
        }
    }

    pub fn today() -> Self {
        Self::from_chrono(chrono::Local::now().weekday())
    }

    pub fn from_chrono(day: chrono::Weekday) -> Self {
        Self::ALL[day.num_days_from_sunday() as usize]
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|d| {
                let name = d.name().to_lowercase();
                lowered == name || (lowered.len() >= 3 && name.starts_with(&lowered))
            })
            .ok_or_else(|| format!("unknown weekday: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

/// The entry that `entry_id` swaps places with when moved, or `None` when the
/// entry is unknown or the day has a single entry.
///
/// Moving the first entry up, or the last entry down, wraps around and swaps
/// the first and last entries.
pub fn swap_partner(entries: &[ScheduleEntry], entry_id: i32, direction: MoveDirection) -> Option<i32> {
    let mut ordered: Vec<&ScheduleEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| (e.sort_order, e.id));
    if ordered.len() < 2 {
        return None;
    }
    let pos = ordered.iter().position(|e| e.id == entry_id)?;
    let last = ordered.len() - 1;
    let partner = match (direction, pos) {
        (MoveDirection::Up, 0) => last,
        (MoveDirection::Up, p) => p - 1,
        (MoveDirection::Down, p) if p == last => 0,
        (MoveDirection::Down, p) => p + 1,
    };
    Some(ordered[partner].id)
}
