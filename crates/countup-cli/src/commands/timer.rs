use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use countup_core::{Timer, TimerEngine};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::CliResult;
use crate::context::App;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Create a new timer
    Add {
        /// Timer name
        name: String,
        /// Advisory target in seconds (0 for none)
        #[arg(long, short, default_value = "0")]
        reference: u64,
    },
    /// List timers as JSON
    List,
    /// Start a timer, pausing any other running one
    Start { timer: String },
    /// Pause a running timer
    Pause { timer: String },
    /// Start if paused, pause if running
    Toggle { timer: String },
    /// Stop a timer and clear it from the widget
    Stop { timer: String },
    /// Zero a timer's elapsed time
    Reset { timer: String },
    /// Rename a timer
    Rename { timer: String, name: String },
    /// Change a timer's reference duration
    SetDuration {
        timer: String,
        /// New reference duration in seconds
        seconds: u64,
    },
    /// Delete a timer
    Remove { timer: String },
    /// Print the widget projection of the active timer
    Status,
    /// Toggle whichever timer is active
    ToggleActive,
    /// Print the widget projection periodically until interrupted
    Watch {
        /// Seconds between updates
        #[arg(long, default_value = "1")]
        interval: u64,
        /// Stop after this many updates
        #[arg(long)]
        count: Option<u64>,
    },
}

#[derive(Serialize)]
struct TimerView {
    id: Uuid,
    name: String,
    reference_duration_secs: u64,
    elapsed_secs: f64,
    running: bool,
    progress: f64,
    exceeded: bool,
    active: bool,
}

impl TimerView {
    fn new(timer: &Timer, active: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self {
            id: timer.id,
            name: timer.name.clone(),
            reference_duration_secs: timer.reference_duration_secs,
            elapsed_secs: timer.current_elapsed_secs(now),
            running: timer.running,
            progress: timer.progress(now),
            exceeded: timer.exceeded(now),
            active: active == Some(timer.id),
        }
    }
}

/// Resolve a timer by full id, unique id prefix, or exact name.
fn resolve(engine: &TimerEngine, needle: &str) -> Result<Uuid, String> {
    if let Ok(id) = Uuid::parse_str(needle) {
        return Ok(id);
    }

    let by_name: Vec<_> = engine.timers().iter().filter(|t| t.name == needle).collect();
    if let [timer] = by_name.as_slice() {
        return Ok(timer.id);
    }

    let by_prefix: Vec<_> = engine
        .timers()
        .iter()
        .filter(|t| t.id.to_string().starts_with(needle))
        .collect();
    match by_prefix.as_slice() {
        [timer] => Ok(timer.id),
        [] if by_name.is_empty() => Err(format!("no timer matches '{needle}'")),
        _ => Err(format!("'{needle}' matches more than one timer")),
    }
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the event, or the timer's current view when nothing changed.
fn print_outcome(app: &App, event: Option<countup_core::Event>, id: Uuid) -> CliResult {
    match event {
        Some(event) => print_json(&event),
        None => match app.engine.timer(id) {
            Some(timer) => print_json(&TimerView::new(
                timer,
                app.engine.active_timer_id(),
                app.engine.now(),
            )),
            None => Err(format!("no timer with id {id}").into()),
        },
    }
}

pub async fn run(action: TimerAction) -> CliResult {
    let mut app = App::open()?;

    match action {
        TimerAction::Add { name, reference } => {
            let event = app.engine.add(&name, reference)?;
            print_json(&event)?;
        }
        TimerAction::List => {
            let now = app.engine.now();
            let active = app.engine.active_timer_id();
            let views: Vec<_> = app
                .engine
                .timers()
                .iter()
                .map(|t| TimerView::new(t, active, now))
                .collect();
            print_json(&views)?;
        }
        TimerAction::Start { timer } => {
            let id = resolve(&app.engine, &timer)?;
            let event = app.engine.start(id);
            print_outcome(&app, event, id)?;
        }
        TimerAction::Pause { timer } => {
            let id = resolve(&app.engine, &timer)?;
            let event = app.engine.pause(id);
            print_outcome(&app, event, id)?;
        }
        TimerAction::Toggle { timer } => {
            let id = resolve(&app.engine, &timer)?;
            let event = app.engine.toggle(id);
            print_outcome(&app, event, id)?;
        }
        TimerAction::Stop { timer } => {
            let id = resolve(&app.engine, &timer)?;
            let event = app.engine.stop(id);
            print_outcome(&app, event, id)?;
        }
        TimerAction::Reset { timer } => {
            let id = resolve(&app.engine, &timer)?;
            let event = app.engine.reset(id);
            print_outcome(&app, event, id)?;
        }
        TimerAction::Rename { timer, name } => {
            let id = resolve(&app.engine, &timer)?;
            let event = app.engine.rename(id, &name)?;
            print_outcome(&app, event, id)?;
        }
        TimerAction::SetDuration { timer, seconds } => {
            let id = resolve(&app.engine, &timer)?;
            let event = app.engine.set_reference_duration(id, seconds);
            print_outcome(&app, event, id)?;
        }
        TimerAction::Remove { timer } => {
            let id = resolve(&app.engine, &timer)?;
            match app.engine.remove(id) {
                Some(event) => print_json(&event)?,
                None => return Err(format!("no timer with id {id}").into()),
            }
        }
        TimerAction::Status => {
            print_json(&app.engine.widget_state())?;
        }
        TimerAction::ToggleActive => match app.engine.toggle_active_timer() {
            Some(event) => print_json(&event)?,
            None => print_json(&json!({ "type": "no_active_timer" }))?,
        },
        TimerAction::Watch { interval, count } => {
            watch(&app, Duration::from_secs(interval.max(1)), count).await?;
        }
    }

    app.finish().await
}

async fn watch(app: &App, interval: Duration, count: Option<u64>) -> CliResult {
    let mut ticker = tokio::time::interval(interval);
    let mut printed = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                println!("{}", serde_json::to_string(&app.engine.widget_state())?);
                printed += 1;
                if count.is_some_and(|limit| printed >= limit) {
                    break;
                }
            }
        }
    }
    Ok(())
}
