use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::thread::sleep;
use std::time::Duration;

use crate::{TaskError, TaskResult};

const CARGO_MANIFEST_DIR: &str = env!("CARGO_MANIFEST_DIR");
const PRINT_PREFIX: &str = "[xtask]";

const SCHEDULER_ADDR: &str = "127.0.0.1:50050";
const OBJSTORE_ADDR: &str = "127.0.0.1:50060";
const WORKER_ADDR: &str = "127.0.0.1:50070";

pub struct TaskHarness {
    root: PathBuf,
}

impl TaskHarness {
    pub fn new() -> TaskResult<Self> {
        let root = match Path::new(CARGO_MANIFEST_DIR).ancestors().nth(1) {
            Some(found_root) => found_root.to_path_buf(),
            None => return Err(TaskError::CouldNotDetermineRepositoryRoot),
        };
        Ok(Self { root })
    }

    fn cargo(&self, args: &'static str) -> TaskResult<()> {
        self.stdout(format!("running: cargo {args}"));

        let mut cmd = Command::new("cargo");
        match cmd
            .current_dir(&self.root)
            .args(args.trim().split(' '))
            .status()?
            .success()
        {
            true => Ok(()),
            false => Err(TaskError::CargoCommandFailed),
        }
    }

    pub fn task_build(&self) -> TaskResult<()> {
        self.cargo("build --workspace --exclude xtask")
    }

    pub fn task_test(&self) -> TaskResult<()> {
        self.cargo("test --workspace --exclude xtask")
    }

    pub fn task_ci(&self) -> TaskResult<()> {
        self.cargo("fmt --all -- --check")?;
        self.cargo("clippy --workspace --exclude xtask --all-targets -- -D warnings")?;
        self.task_test()
    }

    /// Brings up one scheduler, one objstore colocated with one worker, and
    /// runs each crate's `#[ignore]`d `test_grpc_smoke` against the live
    /// cluster. `cargo test`/`cargo nextest` alone can't do this: the smoke
    /// tests need a running peer on the other end of the wire, not just the
    /// compiled binary.
    pub fn task_smoke(&self) -> TaskResult<()> {
        self.task_build()?;

        let mut scheduler = self.spawn_bin(
            "rt-scheduler",
            &[("RT_BIND_ADDR", SCHEDULER_ADDR)],
        )?;
        sleep(Duration::from_millis(500));

        let mut objstore = self.spawn_bin(
            "rt-objstore",
            &[
                ("RT_BIND_ADDR", OBJSTORE_ADDR),
                ("RT_SCHEDULER_ADDR", SCHEDULER_ADDR),
            ],
        )?;
        sleep(Duration::from_millis(500));

        let mut worker = self.spawn_bin(
            "rt-worker",
            &[
                ("RT_BIND_ADDR", WORKER_ADDR),
                ("RT_SCHEDULER_ADDR", SCHEDULER_ADDR),
                ("RT_OBJSTORE_ADDR", OBJSTORE_ADDR),
            ],
        )?;
        sleep(Duration::from_millis(500));

        if scheduler.try_wait()?.is_some() || objstore.try_wait()?.is_some() || worker.try_wait()?.is_some() {
            let _ = scheduler.kill();
            let _ = objstore.kill();
            let _ = worker.kill();
            return Err(TaskError::ClusterDidNotStart);
        }

        let result = Command::new("cargo")
            .current_dir(&self.root)
            .args(["test", "--workspace", "--exclude", "xtask", "--", "--ignored"])
            .env("RT_SCHEDULER_URL", format!("http://{SCHEDULER_ADDR}"))
            .env("RT_OBJSTORE_URL", format!("http://{OBJSTORE_ADDR}"))
            .env("RT_WORKER_URL", format!("http://{WORKER_ADDR}"))
            .status();

        let _ = scheduler.kill();
        let _ = objstore.kill();
        let _ = worker.kill();

        match result?.success() {
            true => Ok(()),
            false => Err(TaskError::CargoCommandFailed),
        }
    }

    fn spawn_bin(&self, bin: &str, envs: &[(&str, &str)]) -> TaskResult<Child> {
        self.stdout(format!("starting: {bin}"));
        let mut cmd = Command::new("cargo");
        cmd.current_dir(&self.root).args(["run", "--quiet", "--bin", bin]);
        for (key, value) in envs {
            cmd.env(key, value);
        }
        Ok(cmd.spawn()?)
    }

    pub fn stdout(&self, contents: impl AsRef<str>) {
        let contents = contents.as_ref();
        println!("{PRINT_PREFIX} {contents}")
    }
}
