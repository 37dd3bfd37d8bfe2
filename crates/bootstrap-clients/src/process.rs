//! Subprocess helpers shared by the CLI-driven adapters.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Output;

use bootstrap_services::{ServiceError, ServiceResult};
use tokio::process::Command;
use tracing::debug;

use crate::error::command_failed;

/// Run `program` to completion and capture its output. Spawn failures are
/// reported as IO errors; the exit status is left to the caller.
pub(crate) async fn run<I, S>(program: &Path, args: I) -> ServiceResult<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    debug!(program = %program.display(), "running subprocess");
    command.output().await.map_err(|e| {
        ServiceError::Io(format!("failed to run {}: {e}", program.display()))
    })
}

/// Run `program` and fail unless it exits successfully.
pub(crate) async fn run_checked<I, S>(program: &Path, args: I) -> ServiceResult<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run(program, args).await?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(command_failed(&program.display().to_string(), &output))
    }
}
