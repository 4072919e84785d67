//! Metric command: evaluate dashboard KPIs via their stored procedures.

use serde::Serialize;
use strum::IntoEnumIterator;
use tabled::Tabled;

use qualisync_core::{DataService, Metric, ServiceConfig, Session};

use crate::cli::{GlobalOpts, MetricArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

#[derive(Tabled, Serialize)]
struct MetricRow {
    metric: String,
    value: String,
}

pub async fn handle(
    mut config: ServiceConfig,
    session: Session,
    args: MetricArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    config.realtime_enabled = false;
    let service = DataService::new(config);
    service.connect(session).await?;

    let result = run(&service, &args, global).await;
    service.end_session().await;
    result
}

async fn run(service: &DataService, args: &MetricArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.all {
        let mut rows = Vec::new();
        for metric in Metric::iter() {
            let value = match service.fetch_metric(metric).await {
                Ok(v) => format_value(metric, v),
                Err(e) => {
                    tracing::debug!(metric = %metric, error = %e, "metric evaluation failed");
                    "n/a".to_owned()
                }
            };
            rows.push(MetricRow {
                metric: metric.to_string(),
                value,
            });
        }

        let rendered = match global.output {
            OutputFormat::Table => output::render_table(&rows),
            OutputFormat::Json => output::render_json(&rows),
            OutputFormat::Plain => rows
                .iter()
                .map(|r| format!("{}\t{}", r.metric, r.value))
                .collect::<Vec<_>>()
                .join("\n"),
        };
        output::print_output(&rendered, global.quiet);
        return Ok(());
    }

    let name = args.metric.as_deref().unwrap_or_default();
    let metric: Metric = name.parse().map_err(|_| CliError::UnknownMetric {
        name: name.to_owned(),
    })?;

    let value = service.fetch_metric(metric).await?;
    let rendered = match global.output {
        OutputFormat::Json => output::render_json(&serde_json::json!({
            "metric": metric.to_string(),
            "value": value,
        })),
        OutputFormat::Table | OutputFormat::Plain => format_value(metric, value),
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn format_value(metric: Metric, value: f64) -> String {
    format!("{value}{}", metric.unit())
}
