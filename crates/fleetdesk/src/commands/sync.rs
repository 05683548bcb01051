//! Sync command: run one session and follow its progress.

use std::io::{self, IsTerminal};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;

use fleetdesk_core::{
    DirectoryFleet, EntityKind, ExternalId, SyncProgress, SyncScope, SyncSummary,
    parse_org_path,
};

use crate::cli::{GlobalOpts, SyncArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    args: SyncArgs,
    fleet: &DirectoryFleet,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let kind = EntityKind::from(args.kind);
    let scope = match (&args.org_unit, args.ids.is_empty()) {
        (_, false) => SyncScope::Items(args.ids.iter().map(ExternalId::new).collect()),
        (Some(path), true) => SyncScope::OrgUnit(parse_org_path(path)?),
        (None, true) => SyncScope::Full,
    };

    let handle = fleet.start_sync(kind, scope);
    let show_bar = !global.quiet && io::stderr().is_terminal();
    follow(handle.progress(), show_bar).await;

    let summary = handle.wait().await?;
    let out = output::render_single(global.output, &summary, |s| detail(kind, s), |s| {
        s.created.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Drive a progress bar from the session's watch channel until it ends.
async fn follow(mut rx: watch::Receiver<SyncProgress>, show_bar: bool) {
    let bar = show_bar.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    });

    loop {
        let finished = {
            let progress = rx.borrow_and_update();
            if let Some(bar) = &bar {
                render(bar, &progress);
            }
            progress.is_terminal()
        };
        if finished || rx.changed().await.is_err() {
            break;
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

fn render(bar: &ProgressBar, progress: &SyncProgress) {
    match progress.total_expected {
        Some(total) => {
            if bar.length() != Some(total) {
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner} {msg} [{bar:30.cyan/blue}] {pos}/{len}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar.set_length(total);
            }
        }
        None => bar.set_style(ProgressStyle::default_spinner()),
    }
    bar.set_position(progress.processed);
    bar.set_message(format!(
        "{} ({}) {}%",
        progress.kind, progress.mode, progress.percent
    ));
}

fn detail(kind: EntityKind, s: &SyncSummary) -> String {
    [
        format!("Synced {kind} in {:.1}s", Duration::from_millis(s.duration_ms).as_secs_f64()),
        format!("  created:   {}", s.created),
        format!("  updated:   {}", s.updated),
        format!("  unchanged: {}", s.unchanged),
        format!("  stale:     {}", s.stale),
        format!("  protected: {}", s.protected),
        format!("  removed:   {}", s.removed),
        format!("  failed:    {}", s.failed),
        format!("  pages:     {} ({} retried)", s.pages, s.retries),
    ]
    .join("\n")
}
