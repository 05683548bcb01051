//! Tree command: render the org unit hierarchy from the cache.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use owo_colors::OwoColorize;

use fleetdesk_core::{DirectoryFleet, EntityKind, OrgTree, ROOT_PATH, parse_org_path};

use crate::cli::{CountKind, GlobalOpts, OutputFormat, TreeArgs};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &TreeArgs, fleet: &DirectoryFleet, global: &GlobalOpts) -> Result<(), CliError> {
    let tree = fleet.org_tree();
    let start = match &args.from {
        Some(raw) => parse_org_path(raw)?,
        None => ROOT_PATH.to_owned(),
    };
    let Some(view) = tree.view_of(&start) else {
        return Err(CliError::NotFound {
            resource_type: "org unit".into(),
            identifier: start,
            list_command: "tree".into(),
        });
    };

    let counts = args.counts.map(|kind| {
        let kind = match kind {
            CountKind::Devices => EntityKind::Devices,
            CountKind::Users => EntityKind::Users,
        };
        fleet.counts_by_path(kind)
    });

    let out = match global.output {
        OutputFormat::Table => {
            render_indented(&tree, &start, counts.as_ref(), output::should_color(global.color))
        }
        OutputFormat::Plain => tree.subtree_paths(&start).join("\n"),
        OutputFormat::Json => serde_json::to_string_pretty(&view)?,
        OutputFormat::JsonCompact => serde_json::to_string(&view)?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

fn render_indented(
    tree: &OrgTree,
    start: &str,
    counts: Option<&BTreeMap<String, usize>>,
    color: bool,
) -> String {
    let base_depth = tree.get(start).map_or(0, |n| n.depth);
    let mut out = String::new();
    for node in tree.walk_subtree(start) {
        let indent = "  ".repeat(node.depth - base_depth);
        let name = if color {
            node.name.bold().to_string()
        } else {
            node.name.clone()
        };
        let _ = write!(out, "{indent}{name}");
        if let Some(counts) = counts {
            let own = counts.get(&node.path).copied().unwrap_or(0);
            let total = tree.subtree_total(counts, &node.path);
            let _ = write!(out, "  ({own} here, {total} total)");
        }
        if node.block_inheritance {
            let _ = write!(out, "  [blocks inheritance]");
        }
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}
