pub mod assistant;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod schedule;
pub mod search;
pub mod session;
pub mod tools;
pub mod ui;

pub use assistant::{Assistant, TurnOutcome};
pub use auth::{Profile, Role};
pub use config::Config;
pub use error::LiftlogError;
pub use session::SessionState;
pub use ui::{ActionOutcome, Fragment, UiStream, UiUpdate, ui_channel};
