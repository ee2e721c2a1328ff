use std::env;

use crate::task_harness::TaskHarness;
use crate::{TaskError, TaskResult};

const HELP_TEXT: &str = "Available tasks:
  build  build all workspace binaries
  test   build and run unit + integration tests (excludes #[ignore]d smoke tests)
  ci     run fmt/clippy checks and test
  smoke  spin up scheduler+objstore+worker and run the wire smoke tests against them";

pub struct Cli;

impl Cli {
    pub fn parse_and_run() -> TaskResult<()> {
        let maybe_argument = env::args()
            .nth(1)
            .as_ref()
            .map(|argument| argument.trim().to_lowercase());

        let harness = TaskHarness::new()?;

        match maybe_argument.as_deref() {
            Some("build") => harness.task_build(),
            Some("test") => harness.task_test(),
            Some("ci") => harness.task_ci(),
            Some("smoke") => harness.task_smoke(),
            Some(invalid_task) => Self::invalid(invalid_task),
            None => Self::help(),
        }
    }

    fn invalid(invalid_task: impl Into<String>) -> TaskResult<()> {
        eprintln!("{HELP_TEXT}");
        Err(TaskError::InvalidTaskProvided(invalid_task.into()))
    }

    fn help() -> TaskResult<()> {
        println!("{HELP_TEXT}");
        Ok(())
    }
}
