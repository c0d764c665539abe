//! Batch file runner
//!
//! Runs the `deltabench` binary on every file under tests/batches/exit-N/
//! and checks that it exits with status N, then drives the command line
//! options over the same fixtures.

use anyhow::{Context, Result, bail};
use glob::glob;
use libtest_mimic::{Arguments, Failed, Trial};
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

const TESTS_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests");
const MAX_STEPS_ENV: &str = "DELTABENCH_MAX_STEPS";

/// One invocation of the binary, run from the tests/ directory.
struct Invocation {
    args: Vec<OsString>,
    env: Vec<(&'static str, &'static str)>,
    status: i32,
    stdout: Vec<&'static str>,
    stderr: Vec<&'static str>,
}

impl Invocation {
    fn new<I, S>(args: I, status: i32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    fn env(mut self, key: &'static str, value: &'static str) -> Self {
        self.env.push((key, value));
        self
    }

    fn stdout(mut self, needle: &'static str) -> Self {
        self.stdout.push(needle);
        self
    }

    fn stderr(mut self, needle: &'static str) -> Self {
        self.stderr.push(needle);
        self
    }
}

const BASICS: &str = "batches/exit-0/basics.yaml";
const OMITTED: &str = "batches/exit-2/omitted-register.yaml";

fn main() -> Result<()> {
    let args = Arguments::from_args();

    let mut tests = discover_tests()?;
    tests.extend(command_line_tests());

    libtest_mimic::run(&args, tests).exit();
}

/// Discover all batch files, keyed by the status directory they live in
fn discover_tests() -> Result<Vec<Trial>> {
    let mut trials = Vec::new();

    for dir in glob(&format!("{TESTS_PATH}/batches/exit-*"))? {
        let dir = dir?;
        let status = status_of(&dir)?;

        for batch in glob(&format!("{}/*.yaml", dir.display()))? {
            let batch = batch?;
            let name = format!("exit-{status}::{}", file_stem(&batch)?);
            let mut invocation = Invocation::new([batch], status).env(MAX_STEPS_ENV, "10000");
            if status == 0 {
                invocation = invocation.stdout("test cases passed");
            }
            trials.push(Trial::test(name, move || run_test(&invocation)));
        }
    }

    Ok(trials)
}

fn command_line_tests() -> Vec<Trial> {
    let cases = [
        (
            "list-prints-labels-in-order",
            Invocation::new(["--list", BASICS, OMITTED], 0).stdout(
                "no-op\nload immediate register pair\nstore via indirect address\n\
                 push and pop through the stack\ndjnz counts down\n\
                 passes first\nlow byte left out\n",
            ),
        ),
        (
            "glob-joins-files-into-one-batch",
            Invocation::new(["batches/exit-0/*.yaml"], 0)
                .stdout("[1/9] no-op\n")
                .stdout("[6/9] exchange accumulator with shadow\n")
                .stdout("All 9 test cases passed"),
        ),
        (
            "failure-index-counts-across-files",
            Invocation::new([BASICS, OMITTED], 2)
                .stdout("[7/7] low byte left out\n")
                .stderr("test case 7/7 (low byte left out) failed"),
        ),
        (
            "config-budget-applies",
            Invocation::new(["--config", "configs/budget-5.yaml", BASICS], 7)
                .stderr("djnz counts down"),
        ),
        (
            "max-steps-overrides-config",
            Invocation::new(["--config", "configs/budget-5.yaml", "--max-steps", "100", BASICS], 0),
        ),
        (
            "unbounded-overrides-config",
            Invocation::new(["--config", "configs/budget-5.yaml", "--unbounded", BASICS], 0),
        ),
        (
            "zero-max-steps-runs-nothing",
            Invocation::new(["--max-steps", "0", BASICS], 7).stderr("step budget of 0"),
        ),
        (
            "env-budget-applies",
            Invocation::new([BASICS], 7).env(MAX_STEPS_ENV, "5"),
        ),
        (
            "env-budget-overrides-config",
            Invocation::new(["--config", "configs/budget-5.yaml", BASICS], 0)
                .env(MAX_STEPS_ENV, "100"),
        ),
        (
            "max-steps-overrides-env",
            Invocation::new(["--max-steps", "100", BASICS], 0).env(MAX_STEPS_ENV, "5"),
        ),
        (
            "non-numeric-env-budget-is-a-usage-error",
            Invocation::new([BASICS], 64)
                .env(MAX_STEPS_ENV, "lots")
                .stderr(MAX_STEPS_ENV),
        ),
        (
            "explicit-pc-policy-flag",
            Invocation::new(["--pc-policy", "explicit", BASICS], 2)
                .stderr("unexpected change of register pc"),
        ),
        (
            "explicit-pc-policy-from-config",
            Invocation::new(["--config", "configs/explicit-pc.yaml", BASICS], 2),
        ),
        (
            "fall-through-flag-overrides-config",
            Invocation::new(
                ["--config", "configs/explicit-pc.yaml", "--pc-policy", "fall-through", BASICS],
                0,
            ),
        ),
        (
            "unknown-config-key-is-a-usage-error",
            Invocation::new(["--config", "configs/unknown-key.yaml", BASICS], 64),
        ),
        (
            "missing-config-is-a-usage-error",
            Invocation::new(["--config", "configs/absent.yaml", BASICS], 64),
        ),
        (
            "unmatched-glob-is-a-usage-error",
            Invocation::new(["batches/exit-0/*.nothing"], 64).stderr("No batch files match"),
        ),
        ("missing-batch-is-a-usage-error", Invocation::new(Vec::<&str>::new(), 64)),
        (
            "conflicting-budget-flags-are-a-usage-error",
            Invocation::new(["--max-steps", "1", "--unbounded", BASICS], 64),
        ),
        ("help-exits-zero", Invocation::new(["--help"], 0).stdout("--max-steps")),
    ];

    cases
        .into_iter()
        .map(|(name, invocation)| {
            Trial::test(format!("cli::{name}"), move || run_test(&invocation))
        })
        .collect()
}

fn status_of(dir: &Path) -> Result<i32> {
    let name = dir
        .file_name()
        .and_then(|name| name.to_str())
        .context("Batch directory has no UTF-8 name")?;
    name.trim_start_matches("exit-")
        .parse()
        .with_context(|| format!("Bad batch directory name {name}"))
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_owned)
        .context("Batch file has no UTF-8 name")
}

/// Run a single invocation
fn run_test(invocation: &Invocation) -> Result<(), Failed> {
    match run_test_impl(invocation) {
        Ok(()) => Ok(()),
        Err(e) => Err(format!("{:#}", e).into()),
    }
}

fn run_test_impl(invocation: &Invocation) -> Result<()> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_deltabench"));
    command
        .current_dir(TESTS_PATH)
        .args(&invocation.args)
        .env_remove("RUST_LOG")
        .env_remove(MAX_STEPS_ENV);
    for (key, value) in &invocation.env {
        command.env(key, value);
    }
    let output = command.output().context("Failed to launch deltabench")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let actual = output.status.code();
    if actual != Some(invocation.status) {
        bail!(
            "expected exit status {}, got {actual:?}\nstdout:\n{stdout}\nstderr:\n{stderr}",
            invocation.status
        );
    }

    for needle in &invocation.stdout {
        if !stdout.contains(needle) {
            bail!("stdout is missing {needle:?}:\n{stdout}");
        }
    }
    for needle in &invocation.stderr {
        if !stderr.contains(needle) {
            bail!("stderr is missing {needle:?}:\n{stderr}");
        }
    }
    Ok(())
}
