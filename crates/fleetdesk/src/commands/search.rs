//! Search command: cached matches first, then the directory lookup.

use serde::Serialize;
use tabled::Tabled;

use fleetdesk_core::{
    Directory, DirectoryEntity, DirectoryFleet, EntityFilter, HitSource,
    SearchHit, UnifiedSearch,
};

use crate::cli::{GlobalOpts, SearchArgs, SearchKind};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct HitRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Org Unit")]
    org_unit: String,
}

#[derive(Serialize)]
struct HitOut<'a, T> {
    source: HitSource,
    #[serde(flatten)]
    entity: &'a T,
}

pub async fn handle(
    args: SearchArgs,
    fleet: &DirectoryFleet,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.kind {
        SearchKind::Devices => run(fleet.device_search(), fleet, &args, global).await,
        SearchKind::Users => run(fleet.user_search(), fleet, &args, global).await,
    }
}

async fn run<D: Directory, T: DirectoryEntity>(
    search: &UnifiedSearch<D, T>,
    fleet: &DirectoryFleet,
    args: &SearchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let hits: Vec<SearchHit<T>> = if args.local {
        T::cache(fleet.store())
            .query(&EntityFilter::matching(&args.term))
            .into_iter()
            .map(|entity| SearchHit {
                entity,
                source: HitSource::Local,
            })
            .collect()
    } else {
        let generation = search.search(&args.term);
        let results = search.wait_settled(generation).await;
        if let Some(err) = &results.remote_error {
            tracing::warn!(error = %err, "directory search failed; showing cached matches only");
        }
        results.hits
    };

    let out: Vec<HitOut<'_, T>> = hits
        .iter()
        .map(|h| HitOut {
            source: h.source,
            entity: &*h.entity,
        })
        .collect();
    let rendered = output::render_list(
        global.output,
        &out,
        |h| HitRow {
            source: h.source.to_string(),
            key: h.entity.natural_key(),
            name: h.entity.display_name().to_owned(),
            org_unit: h.entity.org_unit_path().to_owned(),
        },
        |h| h.entity.natural_key(),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
