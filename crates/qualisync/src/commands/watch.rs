//! Watch command: follow the change feed and print events as they land.

use owo_colors::OwoColorize;

use qualisync_core::{ChangeEvent, ChangeOp, DataService, ServiceConfig, Session};
use tokio::sync::broadcast::error::RecvError;

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    mut config: ServiceConfig,
    session: Session,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    config.realtime_enabled = true;
    let service = DataService::new(config);
    service.connect(session).await?;
    let mut events = service.subscribe_changes().await?;

    if !global.quiet {
        eprintln!("watching change feed (ctrl-c to stop)");
    }

    let color = output::should_color(&global.color);
    let mut seen: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event, global, color);
                    seen += 1;
                    if args.count.is_some_and(|limit| seen >= limit) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("warning: fell behind, {skipped} events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    service.end_session().await;
    Ok(())
}

fn print_event(event: &ChangeEvent, global: &GlobalOpts, color: bool) {
    if matches!(global.output, OutputFormat::Json) {
        output::print_output(
            &serde_json::to_string(event).unwrap_or_default(),
            global.quiet,
        );
        return;
    }

    let timestamp = chrono::Local::now().format("%H:%M:%S");
    let row = event
        .row_id()
        .map_or_else(|| "-".to_owned(), |id| id.to_string());
    let op = if color {
        match event.op {
            ChangeOp::Insert => event.op.as_str().green().to_string(),
            ChangeOp::Update => event.op.as_str().yellow().to_string(),
            ChangeOp::Delete => event.op.as_str().red().to_string(),
        }
    } else {
        event.op.as_str().to_owned()
    };

    output::print_output(
        &format!("{timestamp}  {op:<6}  {:<24}  {row}", event.table),
        global.quiet,
    );
}
