//! Device command handlers.

use std::collections::BTreeMap;

use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use sharkiq_core::{Coordinator, DatapointAck, Device, DeviceCache};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Views ───────────────────────────────────────────────────────────

/// A device plus the coordinator's online verdict.
#[derive(Serialize)]
pub(crate) struct DeviceView {
    #[serde(flatten)]
    device: Device,
    online: bool,
}

impl DeviceView {
    pub(crate) fn new(device: Device, cache: &DeviceCache) -> Self {
        let online = cache.is_online(&device.serial);
        Self { device, online }
    }
}

#[derive(Serialize)]
struct AckView {
    serial: String,
    property: String,
    value: Value,
    updated_at: Option<String>,
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Online")]
    online: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl DeviceRow {
    fn new(view: &DeviceView, color: bool) -> Self {
        let d = &view.device;
        let online = match (view.online, color) {
            (true, true) => "yes".green().to_string(),
            (false, true) => "no".red().to_string(),
            (true, false) => "yes".into(),
            (false, false) => "no".into(),
        };
        Self {
            serial: d.serial.clone(),
            name: d.name.clone(),
            model: d.model.clone().or_else(|| d.oem_model.clone()).unwrap_or_default(),
            status: d.connection_status.clone().unwrap_or_default(),
            online,
            error: d.error_code.clone().unwrap_or_default(),
        }
    }
}

fn detail(view: &DeviceView) -> String {
    let d = &view.device;
    let mut lines = vec![
        format!("Serial:    {}", d.serial),
        format!("Name:      {}", d.name),
        format!("Model:     {}", d.model.as_deref().unwrap_or("-")),
        format!("OEM Model: {}", d.oem_model.as_deref().unwrap_or("-")),
        format!("Status:    {}", d.connection_status.as_deref().unwrap_or("-")),
        format!("Online:    {}", if view.online { "yes" } else { "no" }),
        format!("Error:     {}", d.error_code.as_deref().unwrap_or("-")),
        format!(
            "Last Seen: {}",
            d.last_seen.map_or_else(|| "-".into(), |t| t.to_rfc3339())
        ),
    ];
    if !d.properties.is_empty() {
        lines.push(String::new());
        lines.push("Properties:".into());
        lines.extend(property_lines(&d.properties));
    }
    lines.join("\n")
}

fn property_lines(properties: &BTreeMap<String, Value>) -> impl Iterator<Item = String> + '_ {
    let width = properties.keys().map(String::len).max().unwrap_or(0);
    properties.iter().map(move |(name, value)| {
        let shown = match value {
            Value::String(s) => s.clone(),
            Value::Null => "-".into(),
            other => other.to_string(),
        };
        format!("  {name:<width$}  {shown}")
    })
}

fn ack_detail(ack: &AckView) -> String {
    format!(
        "Set {} on {} to {}",
        ack.property,
        ack.serial,
        match &ack.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    )
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut ctx = Context::open(global, true)?;
    let coordinator = Coordinator::new(ctx.session.clone());

    let synced = coordinator.tick().await;
    ctx.save_refresh_token().await;
    let cache = synced.map_err(|e| CliError::from_sync(&e, &ctx.profile))?;

    let rendered = match args.command {
        DevicesCommand::List => {
            let color = output::should_color(&global.color);
            let views: Vec<DeviceView> = cache
                .devices()
                .cloned()
                .map(|d| DeviceView::new(d, &cache))
                .collect();
            output::render_list(
                &global.output,
                &views,
                |v| DeviceRow::new(v, color),
                |v| v.device.serial.clone(),
            )?
        }

        DevicesCommand::Get { serial } => {
            let device = cache
                .get(&serial)
                .cloned()
                .ok_or_else(|| CliError::NotFound {
                    serial: serial.clone(),
                })?;
            let view = DeviceView::new(device, &cache);
            output::render_single(&global.output, &view, detail, |v| v.device.serial.clone())?
        }

        DevicesCommand::Set {
            serial,
            property,
            value,
        } => {
            let ack: DatapointAck = coordinator
                .set_property(&serial, &property, util::parse_value(&value))
                .await
                .map_err(|e| CliError::from_core(e, &ctx.profile))?;
            let view = AckView {
                serial,
                property,
                value: ack.value,
                updated_at: ack.updated_at.or(ack.created_at),
            };
            output::render_single(&global.output, &view, ack_detail, |a| a.property.clone())?
        }
    };

    coordinator.shutdown().await;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
