//! Dev tooling for this workspace, in the `cargo-xtask` style: a thin
//! dispatcher over `cargo` invocations plus the one thing `cargo` alone
//! can't do — standing up a scheduler/objstore/worker trio long enough to
//! run the `#[ignore]`d wire smoke tests against it.

mod cli;
mod task_harness;

use std::io;
use thiserror::Error;

use crate::cli::Cli;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("cargo command failed")]
    CargoCommandFailed,
    #[error("could not determine repository root")]
    CouldNotDetermineRepositoryRoot,
    #[error("invalid task provided: {0}")]
    InvalidTaskProvided(String),
    #[error("smoke cluster did not come up in time")]
    ClusterDidNotStart,
}

pub type TaskResult<T> = Result<T, TaskError>;

fn main() -> TaskResult<()> {
    Cli::parse_and_run()
}
