//! Refresh command: re-fetch a single collection.

use qualisync_core::{Collection, DataService, ServiceConfig, Session};

use crate::cli::{GlobalOpts, OutputFormat, RefreshArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    mut config: ServiceConfig,
    session: Session,
    args: RefreshArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let collection: Collection = args
        .collection
        .parse()
        .map_err(|_| CliError::UnknownCollection {
            name: args.collection.clone(),
        })?;

    config.realtime_enabled = false;
    let service = DataService::new(config);
    service.connect(session).await?;

    let result = service.refresh(collection).await;
    let count = service.rows(collection).len();
    service.end_session().await;
    result?;

    let rendered = match global.output {
        OutputFormat::Json => output::render_json(&serde_json::json!({
            "collection": collection.name(),
            "rows": count,
        })),
        OutputFormat::Table | OutputFormat::Plain => {
            format!("{}: {count} rows", collection.name())
        }
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}
