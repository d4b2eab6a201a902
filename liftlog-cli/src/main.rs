use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::{debug, error, info};
use std::path::PathBuf;

use liftlog::assistant::{Assistant, TurnOutcome};
use liftlog::auth::{self, Role};
use liftlog::config::Config;
use liftlog::db::models::{Workout, format_timestamp};
use liftlog::logging::{self, LogTarget};
use liftlog::schedule::{MoveDirection, Weekday};
use liftlog::session::{SessionState, UiEntry};
use liftlog::tools::NO_ACTIVE_WORKOUT;
use liftlog::ui::{ActionOutcome, Fragment, SetDraft, UiUpdate, ui_channel};

use crossterm::event::{self, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Constraint, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

#[derive(Parser, Debug)]
#[command(version, about = "Liftlog - conversational workout tracker", long_about = None)]
struct Args {
    /// Profile the session acts for
    #[arg(short, long, default_value = "me", global = true)]
    user: String,
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
    /// Where logs go while the chat screen is open
    #[arg(long, default_value = "liftlog.log", global = true)]
    log_file: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chat with the assistant
    Chat {
        #[arg(short, long, default_value = ".liftlog-session.json")]
        session: PathBuf,
    },
    /// List all workouts from the database
    Workouts {
        #[arg(short, long)]
        verbose: bool,
    },
    Exercise {
        #[command(subcommand)]
        command: ExerciseCommand,
    },
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ExerciseCommand {
    /// Add an exercise that sets can be logged against
    Add { name: String },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    /// Change the role of a profile (user, member, admin)
    Grant { username: String, role: String },
}

const QUICK_PROMPTS: [&str; 4] = [
    "What's my current workout?",
    "Show me all of my workouts",
    "Start a new workout",
    "What's on my schedule today?",
];

const DEFAULT_STATUS: &str = "Enter: send | F1-F4: quick prompts | /help: commands | Esc: quit";

const HELP: &str = "Commands:
  /save                      save the drafted sets
  /discard                   drop the drafted sets
  /start <name> [@ location] start a workout
  /finish [workout id]       finish a workout
  /delete <set id>           delete a set
  /schedule                  show the weekly schedule
  /day <weekday> [name]      set up a schedule day
  /rename <schedule id> <name>
  /add <schedule id> <exercise>
  /up|/down <schedule id> <entry id>
  /remove <schedule id> <entry id>
  /exercise <name>           add an exercise
  /quit";

#[derive(Debug, PartialEq)]
enum SlashCommand {
    Help,
    Quit,
    Save,
    Discard,
    Start { name: String, location: String },
    Finish(Option<i32>),
    Delete(i32),
    Schedule,
    Day { day: Weekday, name: String },
    Rename { schedule_id: i32, name: String },
    Add { schedule_id: i32, exercise: String },
    Move {
        schedule_id: i32,
        entry_id: i32,
        direction: MoveDirection,
    },
    Remove { schedule_id: i32, entry_id: i32 },
    Exercise(String),
}

fn parse_id(raw: &str) -> Result<i32, String> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| format!("expected an id, got {:?}", raw))
}

fn split_first(args: &str) -> (&str, &str) {
    args.split_once(char::is_whitespace)
        .map(|(a, b)| (a, b.trim()))
        .unwrap_or((args, ""))
}

/// `Ok(None)` when the input is a chat message rather than a command.
fn parse_command(input: &str) -> Result<Option<SlashCommand>, String> {
    let Some(rest) = input.trim().strip_prefix('/') else {
        return Ok(None);
    };
    let (cmd, args) = split_first(rest);
    let cmd = cmd.to_lowercase();
    let (first, tail) = split_first(args);

    let command = match cmd.as_str() {
        "help" => SlashCommand::Help,
        "quit" | "q" => SlashCommand::Quit,
        "save" => SlashCommand::Save,
        "discard" => SlashCommand::Discard,
        "start" => {
            let (name, location) = args
                .split_once('@')
                .map(|(n, l)| (n.trim(), l.trim()))
                .unwrap_or((args, ""));
            SlashCommand::Start {
                name: name.to_string(),
                location: location.to_string(),
            }
        }
        "finish" if args.is_empty() => SlashCommand::Finish(None),
        "finish" => SlashCommand::Finish(Some(parse_id(args)?)),
        "delete" => SlashCommand::Delete(parse_id(args)?),
        "schedule" => SlashCommand::Schedule,
        "day" => SlashCommand::Day {
            day: first.parse()?,
            name: tail.to_string(),
        },
        "rename" | "add" if tail.is_empty() => {
            return Err(format!("usage: /{} <schedule id> <text>", cmd));
        }
        "rename" => SlashCommand::Rename {
            schedule_id: parse_id(first)?,
            name: tail.to_string(),
        },
        "add" => SlashCommand::Add {
            schedule_id: parse_id(first)?,
            exercise: tail.to_string(),
        },
        "up" | "down" | "remove" => {
            if tail.is_empty() {
                return Err(format!("usage: /{} <schedule id> <entry id>", cmd));
            }
            let schedule_id = parse_id(first)?;
            let entry_id = parse_id(tail)?;
            match cmd.as_str() {
                "up" => SlashCommand::Move {
                    schedule_id,
                    entry_id,
                    direction: MoveDirection::Up,
                },
                "down" => SlashCommand::Move {
                    schedule_id,
                    entry_id,
                    direction: MoveDirection::Down,
                },
                _ => SlashCommand::Remove {
                    schedule_id,
                    entry_id,
                },
            }
        }
        "exercise" if args.is_empty() => return Err("usage: /exercise <name>".to_string()),
        "exercise" => SlashCommand::Exercise(args.to_string()),
        other => return Err(format!("unknown command /{}, try /help", other)),
    };
    Ok(Some(command))
}

struct ChatApp {
    state: SessionState,
    session_path: PathBuf,
    input_buffer: String,
    busy: bool,
    /// Partial fragment of the turn in flight.
    streaming: Option<Fragment>,
    status_message: String,
    current_workout: Option<Workout>,
    /// Rows of the last set-entry form, saved by `/save`.
    pending_sets: Option<(i32, Vec<SetDraft>)>,
    selected: usize,
}

impl ChatApp {
    fn new(state: SessionState, session_path: PathBuf) -> Self {
        let selected = state.ui.len().saturating_sub(1);
        let mut app = Self {
            state,
            session_path,
            input_buffer: String::new(),
            busy: false,
            streaming: None,
            status_message: DEFAULT_STATUS.to_string(),
            current_workout: None,
            pending_sets: None,
            selected,
        };
        let last_form = app
            .state
            .ui
            .iter()
            .rev()
            .find_map(|entry| set_form(&entry.display));
        app.pending_sets = last_form;
        app
    }

    fn push(&mut self, fragment: Fragment) {
        self.note_fragment(&fragment);
        self.state.ui.push(UiEntry::new(fragment));
        self.selected = self.state.ui.len() - 1;
    }

    fn note_fragment(&mut self, fragment: &Fragment) {
        if let Some(form) = set_form(fragment) {
            self.status_message = format!(
                "{} drafted sets, /save to record them or /discard",
                form.1.len()
            );
            self.pending_sets = Some(form);
        } else if let Some(Fragment::CreateWorkoutForm { .. }) = fragment.walk().last() {
            self.status_message = "/start <name> [@ location] to begin".to_string();
        }
    }

    fn scroll_down(&mut self) {
        if !self.state.ui.is_empty() && self.selected < self.state.ui.len() - 1 {
            self.selected += 1;
        }
    }

    fn scroll_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    async fn refresh_current_workout(&mut self, assistant: &Assistant) {
        match assistant.current_workout(&self.state.username).await {
            Ok(workout) => self.current_workout = workout,
            Err(e) => debug!("Could not load current workout: {}", e),
        }
    }

    /// Takes over the state a turn returned. A rejected turn hands back the
    /// state unchanged, so its entry is added here to keep it on screen.
    fn apply_turn(&mut self, outcome: TurnOutcome) {
        let before = self.state.ui.len();
        self.state = outcome.state;
        self.streaming = None;
        self.busy = false;
        self.status_message = DEFAULT_STATUS.to_string();
        if self.state.ui.len() == before {
            debug!("Turn was not recorded, showing its reply anyway");
            self.push(outcome.entry.display);
        } else {
            self.selected = self.state.ui.len().saturating_sub(1);
            self.note_fragment(&outcome.entry.display);
        }
    }

    fn save_session(&mut self) {
        if let Err(e) = self.state.save(&self.session_path) {
            error!("Failed to save session: {:#}", e);
            self.status_message = format!("Could not save session: {}", e);
        }
    }
}

fn set_form(fragment: &Fragment) -> Option<(i32, Vec<SetDraft>)> {
    fragment.walk().into_iter().find_map(|f| match f {
        Fragment::SetEntryForm { workout_id, rows } => Some((*workout_id, rows.clone())),
        _ => None,
    })
}

fn fragment_style(fragment: &Fragment) -> Style {
    match fragment {
        Fragment::User { .. } => Style::default().fg(Color::Yellow),
        Fragment::Assistant { .. } => Style::default().fg(Color::White),
        Fragment::System { .. } | Fragment::Loading { .. } => Style::default().fg(Color::Gray),
        _ => Style::default().fg(Color::Cyan),
    }
}

fn draw(frame: &mut Frame, app: &ChatApp) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(1),
        Constraint::Length(3),
        Constraint::Length(3),
    ])
    .split(frame.area());

    // Header with the current-workout badge
    let badge = match &app.current_workout {
        Some(w) => format!(
            "{} in progress since {}",
            w.display_name(),
            format_timestamp(w.started_at)
        ),
        None => "No active workout".to_string(),
    };
    let header = Paragraph::new(format!("Liftlog - {} | {}", app.state.username, badge))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, chunks[0]);

    if app.state.ui.is_empty() && app.streaming.is_none() {
        let empty_msg = Paragraph::new("Nothing here yet.\nTry a quick prompt with F1-F4!")
            .style(Style::default().fg(Color::Gray))
            .block(Block::default().borders(Borders::ALL).title("Chat"));
        frame.render_widget(empty_msg, chunks[1]);
    } else {
        let mut items: Vec<ListItem> = app
            .state
            .ui
            .iter()
            .map(|entry| {
                ListItem::new(entry.display.to_string()).style(fragment_style(&entry.display))
            })
            .collect();
        if let Some(partial) = &app.streaming {
            items.push(ListItem::new(partial.to_string()).style(fragment_style(partial)));
        }
        let last = items.len() - 1;

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Chat"))
            .highlight_style(Style::default().add_modifier(Modifier::BOLD));

        let mut list_state = ListState::default();
        list_state.select(Some(if app.busy { last } else { app.selected }));
        frame.render_stateful_widget(list, chunks[1], &mut list_state);
    }

    let (title, style) = if app.busy {
        ("Thinking...", Style::default().fg(Color::DarkGray))
    } else {
        ("Message", Style::default().fg(Color::Yellow))
    };
    let input_widget = Paragraph::new(app.input_buffer.as_str())
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(input_widget, chunks[2]);

    let footer = Paragraph::new(app.status_message.as_str())
        .style(Style::default().fg(Color::White))
        .block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(footer, chunks[3]);
}

async fn submit_turn(
    terminal: &mut DefaultTerminal,
    app: &mut ChatApp,
    assistant: &Assistant,
    input: &str,
) -> Result<()> {
    app.push(Fragment::user(input));
    app.busy = true;
    terminal.draw(|frame| draw(frame, app))?;

    let (sink, mut stream) = ui_channel();
    let turn = assistant.submit_message_streaming(app.state.clone(), input, sink);
    tokio::pin!(turn);

    let outcome = loop {
        tokio::select! {
            outcome = &mut turn => break outcome,
            Some(update) = stream.next() => {
                if let UiUpdate::Pending(fragment) = update {
                    app.streaming = Some(fragment);
                    terminal.draw(|frame| draw(frame, app))?;
                }
            }
        }
    };

    app.apply_turn(outcome);
    app.refresh_current_workout(assistant).await;
    app.save_session();
    Ok(())
}

/// Returns false when the chat should close.
async fn run_command(app: &mut ChatApp, assistant: &Assistant, command: SlashCommand) -> bool {
    let user = app.state.username.clone();
    debug!("run_command called user={} command={:?}", user, command);
    let result = match command {
        SlashCommand::Quit => return false,
        SlashCommand::Help => {
            app.push(Fragment::system(HELP));
            return true;
        }
        SlashCommand::Save => match app.pending_sets.take() {
            Some((workout_id, rows)) => {
                let result = assistant.save_new_sets(&user, workout_id, &rows).await;
                if result.is_err() {
                    app.pending_sets = Some((workout_id, rows));
                }
                result
            }
            None => Ok(ActionOutcome::message("There are no drafted sets to save.")),
        },
        SlashCommand::Discard => {
            app.pending_sets = None;
            Ok(ActionOutcome::message("Discarded the drafted sets."))
        }
        SlashCommand::Start { name, location } => {
            assistant.create_workout(&user, &name, &location).await
        }
        SlashCommand::Finish(id) => match id.or(app.current_workout.as_ref().map(|w| w.id)) {
            Some(id) => assistant.complete_workout(&user, id).await,
            None => Ok(ActionOutcome::message(NO_ACTIVE_WORKOUT)),
        },
        SlashCommand::Delete(id) => assistant.delete_set(&user, id).await,
        SlashCommand::Schedule => assistant.schedule_overview(&user).await.map(ActionOutcome::new),
        SlashCommand::Day { day, name } => assistant.create_schedule_day(&user, day, &name).await,
        SlashCommand::Rename { schedule_id, name } => {
            assistant.rename_schedule_day(&user, schedule_id, &name).await
        }
        SlashCommand::Add {
            schedule_id,
            exercise,
        } => {
            assistant
                .add_schedule_exercise(&user, schedule_id, &exercise)
                .await
        }
        SlashCommand::Move {
            schedule_id,
            entry_id,
            direction,
        } => {
            assistant
                .move_schedule_entry(&user, schedule_id, entry_id, direction)
                .await
        }
        SlashCommand::Remove {
            schedule_id,
            entry_id,
        } => {
            assistant
                .remove_schedule_entry(&user, schedule_id, entry_id)
                .await
        }
        SlashCommand::Exercise(name) => assistant.create_exercise(&user, &name).await,
    };

    match result {
        Ok(outcome) => {
            let stale = !outcome.invalidate.is_empty();
            app.push(outcome.fragment);
            if stale {
                app.refresh_current_workout(assistant).await;
            }
        }
        Err(e) => app.push(Fragment::system(format!("Something went wrong: {}", e))),
    }
    app.save_session();
    true
}

async fn run_chat(
    mut terminal: DefaultTerminal,
    assistant: &Assistant,
    state: SessionState,
    session_path: PathBuf,
) -> Result<()> {
    let mut app = ChatApp::new(state, session_path);
    app.refresh_current_workout(assistant).await;

    loop {
        terminal.draw(|frame| draw(frame, &app))?;

        let event::Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Esc => return Ok(()),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
            KeyCode::Enter => {
                let input = std::mem::take(&mut app.input_buffer);
                if input.trim().is_empty() {
                    continue;
                }
                match parse_command(&input) {
                    Ok(Some(command)) => {
                        if !run_command(&mut app, assistant, command).await {
                            return Ok(());
                        }
                    }
                    Ok(None) => submit_turn(&mut terminal, &mut app, assistant, &input).await?,
                    Err(usage) => app.status_message = usage,
                }
            }
            KeyCode::F(n) => {
                let prompt = usize::from(n)
                    .checked_sub(1)
                    .and_then(|i| QUICK_PROMPTS.get(i));
                if let Some(prompt) = prompt {
                    submit_turn(&mut terminal, &mut app, assistant, prompt).await?;
                }
            }
            KeyCode::Up => app.scroll_up(),
            KeyCode::Down => app.scroll_down(),
            KeyCode::Char(c) => app.input_buffer.push(c),
            KeyCode::Backspace => {
                app.input_buffer.pop();
            }
            _ => {}
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let target = match &args.command {
        Commands::Chat { .. } => LogTarget::File(args.log_file.clone()),
        _ => LogTarget::Stderr,
    };
    if !logging::set_log_level(&args.log_level, target) {
        return Err(anyhow!("Unknown log level: {}", args.log_level));
    }

    let config = Config::from_env()?;
    let assistant = Assistant::from_config(&config)?;
    info!("Starting liftlog for {}", args.user);

    match args.command {
        Commands::Chat { session } => {
            let state = SessionState::load_or_new(&session, &args.user)?;
            let terminal = ratatui::init();
            let result = run_chat(terminal, &assistant, state, session).await;
            ratatui::restore();
            result
        }
        Commands::Workouts { verbose } => {
            let history = assistant.workout_history(&args.user).await?;
            if history.is_empty() {
                println!("No workouts yet");
            }
            for detail in history {
                let status = if detail.workout.in_progress {
                    " (in progress)"
                } else {
                    ""
                };
                println!("{}, {}{}", detail.workout.id, detail.workout.display_name(), status);
                if verbose {
                    for set in &detail.sets {
                        println!("\t{}", set)
                    }
                }
            }
            Ok(())
        }
        Commands::Exercise {
            command: ExerciseCommand::Add { name },
        } => {
            let outcome = assistant.create_exercise(&args.user, &name).await?;
            println!("{}", outcome.fragment);
            Ok(())
        }
        Commands::Profile {
            command: ProfileCommand::Grant { username, role },
        } => {
            let role: Role = role.parse()?;
            if auth::set_role(assistant.store(), &username, role).await? {
                println!("{} is now {}", username, role);
            } else {
                println!("No profile named {}", username);
            }
            Ok(())
        }
    }
}
