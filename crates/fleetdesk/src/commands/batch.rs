//! Batch command: run one lending operation across many devices.

use std::io::{self, IsTerminal};

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tabled::Tabled;
use tokio::sync::mpsc;

use fleetdesk_core::{
    BatchLedger, BatchOperation, DirectoryFleet, LifecycleTicket, TicketStatus,
};

use crate::cli::{BatchArgs, BatchCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output::{self, or_dash};

use super::util;

#[derive(Tabled)]
struct TicketRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Input")]
    identifier: String,
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "From")]
    source: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl TicketRow {
    fn new(t: &LifecycleTicket, color: bool) -> Self {
        Self {
            index: t.index + 1,
            identifier: t.identifier.clone(),
            serial: t.serial_number.clone(),
            source: t.source_org_unit.clone(),
            status: output::paint_ticket(t.status, color),
            message: or_dash(t.message.as_deref()),
        }
    }
}

pub async fn handle(
    args: BatchArgs,
    fleet: &DirectoryFleet,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let targets = args.command.targets();
    let identifiers =
        util::read_identifiers(&targets.identifiers, targets.from_file.as_deref())?;

    let operation = match args.command {
        BatchCommand::Checkout { assignee, .. } => BatchOperation::Checkout { assignee },
        BatchCommand::Checkin { .. } => BatchOperation::Checkin,
        BatchCommand::Reset { .. } => {
            util::confirm(
                "reset",
                &format!(
                    "Wipe all user data from {} device(s)? This cannot be undone",
                    identifiers.len()
                ),
                global,
            )?;
            BatchOperation::Reset { confirmed: true }
        }
        BatchCommand::Migrate { to, .. } => BatchOperation::Migrate {
            target_org_unit: to,
        },
    };

    let color = output::should_color(global.color);
    let (tx, rx) = mpsc::unbounded_channel();
    let show_progress = !global.quiet && io::stderr().is_terminal();
    let printer = tokio::spawn(follow_tickets(rx, show_progress, color));

    let outcome = fleet.run_batch(operation, &identifiers, Some(tx)).await;
    // The sender is gone once the batch returns, so the printer drains and exits.
    let _ = printer.await;
    let outcome = outcome?;
    let ledger = &outcome.ledger;

    if !global.quiet {
        for invalid in &ledger.invalid {
            eprintln!("skipped {:?}: {}", invalid.input, invalid.reason);
        }
    }

    if let Some(refresh) = &outcome.refresh {
        match refresh.wait().await {
            Ok(summary) => tracing::debug!(updated = summary.updated, "post-batch refresh finished"),
            Err(e) => tracing::warn!(error = %e, "post-batch refresh failed; run fleetdesk sync devices"),
        }
    }

    let out = render_ledger(ledger, global.output, color)?;
    output::print_output(&out, global.quiet);

    match ledger.failed() {
        0 => Ok(()),
        failed => Err(CliError::BatchFailures {
            failed,
            total: ledger.total(),
        }),
    }
}

/// Show live progress from ticket updates. Only terminal tickets advance
/// the bar; pending ones grow its length.
async fn follow_tickets(
    mut rx: mpsc::UnboundedReceiver<LifecycleTicket>,
    show: bool,
    color: bool,
) {
    let bar = show.then(|| {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg} [{bar:30.green/white}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    });

    while let Some(ticket) = rx.recv().await {
        let Some(bar) = &bar else { continue };
        match ticket.status {
            TicketStatus::Pending => bar.inc_length(1),
            TicketStatus::Processing => bar.set_message(ticket.serial_number.clone()),
            TicketStatus::Success | TicketStatus::Error => {
                bar.inc(1);
                let mark = match (ticket.status, color) {
                    (TicketStatus::Success, true) => "ok".green().to_string(),
                    (TicketStatus::Success, false) => "ok".into(),
                    (_, true) => "error".red().to_string(),
                    (_, false) => "error".into(),
                };
                bar.println(format!(
                    "{mark} {} {}",
                    ticket.serial_number,
                    ticket.message.as_deref().unwrap_or_default()
                ));
            }
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

fn render_ledger(ledger: &BatchLedger, format: OutputFormat, color: bool) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Table => {
            let table = output::render_list(
                format,
                &ledger.tickets,
                |t| TicketRow::new(t, color),
                |t| t.serial_number.clone(),
            )?;
            let target = ledger
                .target_org_unit
                .as_deref()
                .map(|t| format!(" -> {t}"))
                .unwrap_or_default();
            format!(
                "{table}\n{}{target}: {} succeeded, {} failed, {} skipped",
                ledger.operation,
                ledger.succeeded(),
                ledger.failed(),
                ledger.invalid.len()
            )
        }
        OutputFormat::Plain => ledger
            .tickets
            .iter()
            .map(|t| format!("{}\t{}", t.serial_number, t.status))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => serde_json::to_string_pretty(ledger)?,
        OutputFormat::JsonCompact => serde_json::to_string(ledger)?,
    })
}
