//! Device command handlers.

use std::sync::Arc;

use tabled::Tabled;

use fleetdesk_core::{DeviceLifecycle, Device, DirectoryFleet};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output::{self, or_dash};

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub(super) struct DeviceRow {
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Asset Tag")]
    asset_tag: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Org Unit")]
    org_unit: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Assignee")]
    assignee: String,
}

impl DeviceRow {
    pub(super) fn new(d: &Device, color: bool) -> Self {
        Self {
            serial: d.serial_number.clone(),
            asset_tag: or_dash(d.asset_tag.as_deref()),
            model: or_dash(d.model.as_deref()),
            org_unit: d.org_unit_path.clone(),
            status: output::paint_status(d.status, color),
            assignee: or_dash(d.assignee.as_deref()),
        }
    }
}

pub(super) fn detail(d: &Device) -> String {
    let mut lines = vec![
        format!("Serial:    {}", d.serial_number),
        format!("Asset Tag: {}", or_dash(d.asset_tag.as_deref())),
        format!("ID:        {}", d.external_id),
        format!("Model:     {}", or_dash(d.model.as_deref())),
        format!("Org Unit:  {}", d.org_unit_path),
        format!("Status:    {} ({})", d.status, d.status_source),
        format!("Assignee:  {}", or_dash(d.assignee.as_deref())),
        format!("Location:  {}", or_dash(d.location.as_deref())),
        format!("OS:        {}", or_dash(d.os_version.as_deref())),
    ];
    if let Some(seen) = d.last_seen_at {
        lines.push(format!("Last Seen: {}", seen.format("%Y-%m-%d %H:%M")));
    }
    lines.push(format!(
        "Synced:    {}",
        d.last_synced_at.format("%Y-%m-%d %H:%M:%S")
    ));
    if let Some(notes) = d.notes.as_deref().filter(|n| !n.is_empty()) {
        lines.push(format!("Notes:     {notes}"));
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(
    args: DevicesArgs,
    fleet: &DirectoryFleet,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(global.color);

    let out = match args.command {
        DevicesCommand::List(list) => {
            let filter = util::list_filter(&list)?;
            let devices = util::apply_limit(fleet.devices(&filter), list.limit);
            if devices.is_empty() && fleet.store().devices().is_empty() && !global.quiet {
                eprintln!("No devices cached yet. Run: fleetdesk sync devices");
            }
            output::render_list(
                global.output,
                &devices,
                |d| DeviceRow::new(d, color),
                |d| d.serial_number.clone(),
            )?
        }
        DevicesCommand::Get { identifier } => {
            let device = fleet.resolve_device(&identifier)?;
            render_device(global, &device)?
        }
        DevicesCommand::Mark { identifier, step } => {
            let device = fleet.apply_local_transition(&identifier, DeviceLifecycle::from(step))?;
            render_device(global, &device)?
        }
    };

    output::print_output(&out, global.quiet);
    Ok(())
}

fn render_device(global: &GlobalOpts, device: &Arc<Device>) -> Result<String, CliError> {
    output::render_single(global.output, device.as_ref(), detail, |d| {
        d.serial_number.clone()
    })
}
