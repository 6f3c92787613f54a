//! `sharkiq watch`: run the coordinator and print each sync outcome.

use std::sync::Arc;

use chrono::{Local, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use sharkiq_core::{Coordinator, SyncEvent};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::devices::DeviceView;
use super::util;

/// One structured line per sync outcome.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchLine {
    Refreshed {
        at: String,
        devices: Vec<DeviceView>,
    },
    TransientFailure {
        at: String,
        kind: String,
        message: String,
    },
    ReauthRequired {
        at: String,
        message: String,
    },
    InteractionRequired {
        at: String,
        url: String,
    },
}

impl WatchLine {
    fn new(event: &SyncEvent, coordinator: &Coordinator) -> Self {
        let at = Utc::now().to_rfc3339();
        match event {
            SyncEvent::Refreshed { .. } => {
                let cache = coordinator.snapshot();
                let devices = cache
                    .devices()
                    .cloned()
                    .map(|d| DeviceView::new(d, &cache))
                    .collect();
                Self::Refreshed { at, devices }
            }
            SyncEvent::TransientFailure { kind, message } => Self::TransientFailure {
                at,
                kind: kind.to_string(),
                message: message.clone(),
            },
            SyncEvent::ReauthRequired { message } => Self::ReauthRequired {
                at,
                message: message.clone(),
            },
            SyncEvent::InteractionRequired { url } => Self::InteractionRequired {
                at,
                url: url.to_string(),
            },
        }
    }
}

fn human_line(event: &SyncEvent, coordinator: &Coordinator, color: bool) -> String {
    let stamp = Local::now().format("%H:%M:%S").to_string();
    let stamp = if color { stamp.dimmed().to_string() } else { stamp };

    match event {
        SyncEvent::Refreshed { devices, online } => {
            let mut lines = vec![format!("{stamp} synced {devices} device(s), {online} online")];
            let cache = coordinator.snapshot();
            for d in cache.devices() {
                let state = match (cache.is_online(&d.serial), color) {
                    (true, true) => "online".green().to_string(),
                    (false, true) => "offline".red().to_string(),
                    (true, false) => "online".into(),
                    (false, false) => "offline".into(),
                };
                lines.push(format!("         {}  {}  {state}", d.serial, d.name));
            }
            lines.join("\n")
        }
        SyncEvent::TransientFailure { kind, message } => {
            let label = format!("{kind} failure");
            let label = if color { label.yellow().to_string() } else { label };
            format!("{stamp} {label}: {message} (keeping last snapshot)")
        }
        SyncEvent::ReauthRequired { message } => {
            let label = if color {
                "sign-in rejected".red().to_string()
            } else {
                "sign-in rejected".into()
            };
            format!("{stamp} {label}: {message}")
        }
        SyncEvent::InteractionRequired { url } => {
            format!("{stamp} verification required: {url}")
        }
    }
}

fn render(
    event: &SyncEvent,
    coordinator: &Coordinator,
    global: &GlobalOpts,
) -> Result<String, CliError> {
    match global.output {
        OutputFormat::Table | OutputFormat::Plain => Ok(human_line(
            event,
            coordinator,
            output::should_color(&global.color),
        )),
        // One document per line keeps the stream parseable.
        OutputFormat::Json | OutputFormat::JsonCompact => {
            Ok(serde_json::to_string(&WatchLine::new(event, coordinator))?)
        }
        OutputFormat::Yaml => Ok(format!(
            "---\n{}",
            serde_yaml::to_string(&WatchLine::new(event, coordinator))?
        )),
    }
}

/// Signals that end the watch: both need the user before sync can resume.
fn terminal(event: &SyncEvent, profile: &str) -> Option<CliError> {
    match event {
        SyncEvent::ReauthRequired { message } => Some(CliError::AuthFailed {
            profile: profile.into(),
            message: message.clone(),
        }),
        SyncEvent::InteractionRequired { url } => Some(CliError::InteractionRequired {
            url: url.to_string(),
        }),
        _ => None,
    }
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.interval == Some(0) {
        return Err(CliError::Validation {
            field: "interval".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    let mut ctx = Context::open_with_interval(global, true, args.interval)?;
    let coordinator = Coordinator::new(ctx.session.clone());
    let mut events = coordinator.events();
    let cancel = util::cancel_on_interrupt();

    tokio::select! {
        () = cancel.cancelled() => {
            coordinator.shutdown().await;
            return Ok(());
        }
        _ = coordinator.start() => {}
    }

    let mut seen: u32 = 0;
    let outcome = loop {
        let event: Arc<SyncEvent> = tokio::select! {
            () = cancel.cancelled() => break Ok(()),
            received = events.recv() => match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "watch fell behind, some sync outcomes were dropped");
                    continue;
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        };

        ctx.save_refresh_token().await;
        let line = match render(&event, &coordinator, global) {
            Ok(line) => line,
            Err(e) => break Err(e),
        };
        output::print_output(&line, global.quiet);

        if let Some(err) = terminal(&event, &ctx.profile) {
            break Err(err);
        }
        seen += 1;
        if args.count.is_some_and(|limit| seen >= limit) {
            break Ok(());
        }
    };

    coordinator.shutdown().await;
    outcome
}
