//! Command dispatch: bridges CLI args -> DataService operations -> output.

pub mod config_cmd;
pub mod metric;
pub mod refresh;
pub mod status;
pub mod watch;

use qualisync_core::{ServiceConfig, Session};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    config: ServiceConfig,
    session: Session,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Status(args) => status::handle(config, session, args, global).await,
        Command::Refresh(args) => refresh::handle(config, session, args, global).await,
        Command::Watch(args) => watch::handle(config, session, args, global).await,
        Command::Metric(args) => metric::handle(config, session, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
