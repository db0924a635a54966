//! End-to-end start/shutdown tests driven by scripted build and launch tools.
//!
//! `sh` stands in for both `mvn` and `java`, so these only run on unix.
#![cfg(unix)]

use std::collections::HashMap;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use apprunner::io::sink::MemorySink;
use apprunner::io::waiter::{
    Immediate, OutputPatternWaiter, StartupProbe, StartupWaiter, WaitError,
};
use apprunner::test_support::{TestProject, packaging_script, shell_runner, wait_for_line};
use regex::Regex;

const LONG_RUNNING_APP: &str = "echo \"app up from $2\"; exec sleep 30";

fn project(artifact_id: &str, version: &str) -> TestProject {
    let project = TestProject::new();
    project.write_pom(artifact_id, version);
    project
}

fn pattern_waiter(pattern: &str, timeout: Duration) -> OutputPatternWaiter {
    OutputPatternWaiter::new(Regex::new(pattern).expect("regex"), timeout)
}

#[test]
fn failed_build_reports_build_error_and_starts_nothing() {
    let project = project("app", "1.0");
    let runner = shell_runner(
        &project,
        "echo '[ERROR] compilation failure'; exit 3",
        LONG_RUNNING_APP,
    );
    let build_log = MemorySink::new();

    let err = runner
        .start(
            &build_log,
            Arc::new(MemorySink::new()),
            &HashMap::new(),
            &Immediate,
        )
        .unwrap_err();

    assert_eq!(err.message(), "Build returned error");
    assert_eq!(
        err.cause().map(ToString::to_string).as_deref(),
        Some("build exited with code 3")
    );
    assert!(build_log.contains("[ERROR] compilation failure"));
    assert!(runner.process().is_none());
    runner.shutdown();
}

#[test]
fn build_without_artifact_names_expected_jar() {
    let project = project("app", "1.0");
    let runner = shell_runner(&project, "echo nothing packaged", LONG_RUNNING_APP);

    let err = runner
        .start(
            &MemorySink::new(),
            Arc::new(MemorySink::new()),
            &HashMap::new(),
            &Immediate,
        )
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        format!(
            "Could not find the jar file at {}",
            project.path().join("target/app-1.0.jar").display()
        )
    );
    assert!(runner.process().is_none());
}

#[test]
fn successful_start_streams_console_and_shutdown_stops_it() {
    let project = project("svc", "2.3.1");
    let runner = shell_runner(&project, &packaging_script("svc", "2.3.1"), LONG_RUNNING_APP);
    let build_log = MemorySink::new();
    let console = Arc::new(MemorySink::new());

    runner
        .start(&build_log, console.clone(), &HashMap::new(), &Immediate)
        .expect("start");

    assert!(build_log.contains("building"));
    let handle = runner.process().expect("running process");
    assert!(!handle.has_exited());
    assert!(wait_for_line(
        &console,
        "app up from target/svc-2.3.1.jar",
        Duration::from_secs(5)
    ));

    runner.shutdown();
    assert!(handle.has_exited());
    assert!(runner.process().is_none());
    runner.shutdown();
}

#[test]
fn environment_reaches_the_application() {
    let project = project("svc", "1.0");
    let runner = shell_runner(
        &project,
        &packaging_script("svc", "1.0"),
        "echo \"port=$PORT\"; exec sleep 30",
    );
    let console = Arc::new(MemorySink::new());
    let env = HashMap::from([("PORT".to_string(), "8080".to_string())]);

    runner
        .start(&MemorySink::new(), console.clone(), &env, &Immediate)
        .expect("start");

    assert!(wait_for_line(&console, "port=8080", Duration::from_secs(5)));
    runner.shutdown();
}

#[test]
fn ready_pattern_holds_start_until_matched() {
    let project = project("svc", "1.0");
    let runner = shell_runner(
        &project,
        &packaging_script("svc", "1.0"),
        "echo booting; sleep 0.3; echo 'Started svc in 0.3 seconds'; exec sleep 30",
    );
    let console = Arc::new(MemorySink::new());

    runner
        .start(
            &MemorySink::new(),
            console.clone(),
            &HashMap::new(),
            &pattern_waiter(r"Started \w+ in", Duration::from_secs(10)),
        )
        .expect("start");

    assert!(console.contains("Started svc in 0.3 seconds"));
    runner.shutdown();
}

#[test]
fn startup_timeout_destroys_process_and_logs_failure() {
    let project = project("svc", "1.0");
    let runner = shell_runner(&project, &packaging_script("svc", "1.0"), LONG_RUNNING_APP);
    let build_log = MemorySink::new();

    let err = runner
        .start(
            &build_log,
            Arc::new(MemorySink::new()),
            &HashMap::new(),
            &pattern_waiter("never printed", Duration::from_millis(300)),
        )
        .unwrap_err();

    let expected = format!(
        "Built successfully, but timed out waiting for startup at {}",
        project.path().display()
    );
    assert_eq!(err.message(), expected);
    assert!(build_log.contains(&expected));
    assert!(runner.process().is_none());
}

#[test]
fn app_exiting_during_startup_is_too_soon() {
    let project = project("svc", "1.0");
    let runner = shell_runner(
        &project,
        &packaging_script("svc", "1.0"),
        "echo 'port already in use'; exit 1",
    );
    let build_log = MemorySink::new();
    let console = Arc::new(MemorySink::new());

    let err = runner
        .start(
            &build_log,
            console.clone(),
            &HashMap::new(),
            &pattern_waiter("never printed", Duration::from_secs(10)),
        )
        .unwrap_err();

    assert_eq!(
        err.message(),
        format!(
            "The project at {} started but exited all too soon. \
             Check the console log for information.",
            project.path().display()
        )
    );
    assert!(build_log.contains("exited all too soon"));
    assert!(wait_for_line(&console, "port already in use", Duration::from_secs(5)));
    assert!(runner.process().is_none());
}

#[test]
fn restart_replaces_previous_process() {
    let project = project("svc", "1.0");
    let runner = shell_runner(&project, &packaging_script("svc", "1.0"), LONG_RUNNING_APP);

    runner
        .start(
            &MemorySink::new(),
            Arc::new(MemorySink::new()),
            &HashMap::new(),
            &Immediate,
        )
        .expect("first start");
    let first = runner.process().expect("first process");

    runner
        .start(
            &MemorySink::new(),
            Arc::new(MemorySink::new()),
            &HashMap::new(),
            &Immediate,
        )
        .expect("second start");
    let second = runner.process().expect("second process");

    assert!(first.has_exited());
    assert_ne!(first.pid(), second.pid());
    assert!(!second.has_exited());
    runner.shutdown();
    assert!(second.has_exited());
}

#[test]
fn concurrent_runners_keep_their_logs_apart() {
    let alpha = project("alpha", "1.0");
    let beta = project("beta", "1.0");
    let alpha_runner = shell_runner(
        &alpha,
        &format!("echo building-alpha; {}", packaging_script("alpha", "1.0")),
        "echo console-alpha; exec sleep 30",
    );
    let beta_runner = shell_runner(
        &beta,
        &format!("echo building-beta; {}", packaging_script("beta", "1.0")),
        "echo console-beta; exec sleep 30",
    );
    let alpha_build = MemorySink::new();
    let beta_build = MemorySink::new();
    let alpha_console = Arc::new(MemorySink::new());
    let beta_console = Arc::new(MemorySink::new());

    thread::scope(|scope| {
        scope.spawn(|| {
            alpha_runner
                .start(
                    &alpha_build,
                    alpha_console.clone(),
                    &HashMap::new(),
                    &Immediate,
                )
                .expect("alpha start")
        });
        scope.spawn(|| {
            beta_runner
                .start(&beta_build, beta_console.clone(), &HashMap::new(), &Immediate)
                .expect("beta start")
        });
    });

    assert!(wait_for_line(&alpha_console, "console-alpha", Duration::from_secs(5)));
    assert!(wait_for_line(&beta_console, "console-beta", Duration::from_secs(5)));
    assert!(alpha_build.contains("building-alpha"));
    assert!(!alpha_build.contains("building-beta"));
    assert!(beta_build.contains("building-beta"));
    assert!(!beta_build.contains("building-alpha"));
    assert!(!alpha_console.contains("console-beta"));
    assert!(!beta_console.contains("console-alpha"));

    alpha_runner.shutdown();
    beta_runner.shutdown();
}

#[test]
fn shutdown_from_another_thread_ends_wait() {
    let project = project("svc", "1.0");
    let runner = shell_runner(&project, &packaging_script("svc", "1.0"), LONG_RUNNING_APP);
    runner
        .start(
            &MemorySink::new(),
            Arc::new(MemorySink::new()),
            &HashMap::new(),
            &Immediate,
        )
        .expect("start");
    let handle = runner.process().expect("running process");

    thread::scope(|scope| {
        let waiter = scope.spawn(|| handle.wait());
        thread::sleep(Duration::from_millis(100));
        runner.shutdown();
        let status = waiter.join().expect("wait thread");
        assert!(!status.success());
    });
}

/// Health check that always refuses, remembering which pid it looked at.
#[derive(Default)]
struct RefusingCheck {
    seen_pid: Mutex<Option<u32>>,
}

impl StartupWaiter for RefusingCheck {
    fn block_until_ready(&self, probe: &StartupProbe) -> Result<(), WaitError> {
        *self.seen_pid.lock().expect("lock") = Some(probe.pid());
        Err(WaitError::Failed("port 8080 refused connection".into()))
    }
}

fn pid_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .expect("run kill")
        .success()
}

#[test]
fn failed_startup_check_destroys_process_and_logs_cause() {
    let project = project("svc", "1.0");
    let runner = shell_runner(&project, &packaging_script("svc", "1.0"), LONG_RUNNING_APP);
    let build_log = MemorySink::new();
    let check = RefusingCheck::default();

    let err = runner
        .start(
            &build_log,
            Arc::new(MemorySink::new()),
            &HashMap::new(),
            &check,
        )
        .unwrap_err();

    let expected = format!(
        "Built successfully, but error on start for {}",
        project.path().display()
    );
    assert_eq!(err.message(), expected);
    let cause = err.cause().expect("cause");
    assert_eq!(cause.to_string(), "startup check failed");
    assert_eq!(
        cause.source().map(ToString::to_string).as_deref(),
        Some("port 8080 refused connection")
    );
    assert!(build_log.contains(&expected));
    assert!(build_log.contains("startup check failed: port 8080 refused connection"));

    let pid = check.seen_pid.lock().expect("lock").expect("check ran");
    assert!(!pid_alive(pid));
    assert!(runner.process().is_none());
}

#[test]
fn shutdown_during_build_does_not_interrupt_start() {
    let project = project("svc", "1.0");
    let runner = shell_runner(
        &project,
        &format!("sleep 0.5; {}", packaging_script("svc", "1.0")),
        LONG_RUNNING_APP,
    );
    let build_log = MemorySink::new();

    thread::scope(|scope| {
        let starting = scope.spawn(|| {
            runner.start(
                &build_log,
                Arc::new(MemorySink::new()),
                &HashMap::new(),
                &Immediate,
            )
        });
        thread::sleep(Duration::from_millis(100));
        runner.shutdown();
        starting
            .join()
            .expect("start thread")
            .expect("start succeeds");
    });

    assert!(build_log.contains("building"));
    let handle = runner.process().expect("process survives early shutdown");
    assert!(!handle.has_exited());
    runner.shutdown();
    assert!(handle.has_exited());
}

#[test]
fn natural_exit_keeps_handle_until_shutdown() {
    let project = project("svc", "1.0");
    let runner = shell_runner(
        &project,
        &packaging_script("svc", "1.0"),
        "echo done; sleep 0.3; exit 0",
    );

    runner
        .start(
            &MemorySink::new(),
            Arc::new(MemorySink::new()),
            &HashMap::new(),
            &Immediate,
        )
        .expect("start");
    let handle = runner.process().expect("process handle");
    let status = handle
        .wait_timeout(Duration::from_secs(5))
        .expect("app exits on its own");
    assert!(status.success());

    let kept = runner.process().expect("handle kept after exit");
    assert!(kept.has_exited());
    assert_eq!(kept.pid(), handle.pid());

    runner.shutdown();
    assert!(runner.process().is_none());
}
