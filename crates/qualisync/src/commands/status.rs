//! Status command: run the staged load and report per-collection state.

use std::time::Instant;

use owo_colors::OwoColorize;
use serde::Serialize;
use strum::IntoEnumIterator;
use tabled::Tabled;

use qualisync_core::{Collection, CollectionState, DataService, ServiceConfig, Session};

use crate::cli::{GlobalOpts, OutputFormat, StatusArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled, Serialize)]
struct StatusRow {
    collection: String,
    wave: String,
    state: String,
    rows: usize,
}

pub async fn handle(
    mut config: ServiceConfig,
    session: Session,
    args: StatusArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    // One-shot load; the change feed is not needed here.
    config.realtime_enabled = false;
    let service = DataService::new(config);

    let started = Instant::now();
    service.start(session).await?;
    let elapsed = started.elapsed();

    let color = output::should_color(&global.color);
    let mut failed = 0usize;

    let rows: Vec<StatusRow> = Collection::iter()
        .filter_map(|collection| {
            let state = service.state(collection);
            if state.is_failed() {
                failed += 1;
            } else if args.failed {
                return None;
            }
            Some(StatusRow {
                collection: collection.name().to_owned(),
                wave: collection.wave().to_string(),
                state: state_label(&state, color),
                rows: service.rows(collection).len(),
            })
        })
        .collect();

    let rendered = match global.output {
        OutputFormat::Table => output::render_table(&rows),
        OutputFormat::Json => output::render_json(&rows),
        OutputFormat::Plain => rows
            .iter()
            .map(|r| format!("{}\t{}", r.collection, r.rows))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    output::print_output(&rendered, global.quiet);

    if !global.quiet {
        let summary = format!(
            "{} collections loaded in {:.1}s ({failed} failed)",
            Collection::iter().count(),
            elapsed.as_secs_f64(),
        );
        if color && failed > 0 {
            eprintln!("{}", summary.yellow());
        } else {
            eprintln!("{summary}");
        }
    }

    service.end_session().await;
    Ok(())
}

fn state_label(state: &CollectionState, color: bool) -> String {
    if !color {
        return state.label().to_owned();
    }
    match state {
        CollectionState::Loaded(_) => state.label().green().to_string(),
        CollectionState::Failed(_) => state.label().red().to_string(),
        CollectionState::NotLoaded | CollectionState::Loading => {
            state.label().dimmed().to_string()
        }
    }
}
