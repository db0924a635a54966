//! Build a checked-out project and run its artifact under supervision.
//!
//! `apprunner run <dir>` detects the build tool, builds the project, launches
//! the artifact and stays attached until the application exits. Build output
//! goes to stderr, application output to stdout; both can also be written to
//! log files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use apprunner::exit_codes;
use apprunner::factory::{MavenRunnerFactory, RunnerFactory, probe_all};
use apprunner::io::config::{AppRunnerConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use apprunner::io::sink::{FileSink, SharedSink, TeeSink};
use apprunner::logging;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "apprunner",
    version,
    about = "Build a project and run its artifact under supervision"
)]
struct Cli {
    /// Log runner diagnostics at info level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Report which build tool applies to a project.
    Probe {
        project: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Print a JSON object instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Build the project, start its artifact and wait for it to exit.
    Run {
        project: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Extra environment variable for the application (repeatable).
        #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
        env: Vec<(String, String)>,
        /// Also write build output to this file.
        #[arg(long)]
        build_log: Option<PathBuf>,
        /// Also write application output to this file.
        #[arg(long)]
        console_log: Option<PathBuf>,
        /// Regex on application output that marks it as ready.
        #[arg(long)]
        ready_pattern: Option<String>,
        /// Seconds to wait for the ready pattern.
        #[arg(long, value_name = "SECS")]
        ready_timeout: Option<u64>,
    },
}

#[derive(Serialize)]
struct ProbeReport<'a> {
    project: &'a Path,
    builder: String,
    goals: &'a [String],
}

fn main() {
    let cli = Cli::parse();
    logging::init(if cli.verbose { "apprunner=info" } else { "warn" });
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::CANNOT_START);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Probe {
            project,
            config,
            json,
        } => cmd_probe(&project, &config, json),
        Command::Run {
            project,
            config,
            env,
            build_log,
            console_log,
            ready_pattern,
            ready_timeout,
        } => {
            let mut cfg = load_config(&config)?;
            if ready_pattern.is_some() {
                cfg.startup.ready_pattern = ready_pattern;
            }
            if let Some(secs) = ready_timeout {
                cfg.startup.timeout_secs = secs;
            }
            cfg.env.extend(env);
            cfg.validate()?;
            cmd_run(
                &project,
                &cfg,
                build_log.as_deref(),
                console_log.as_deref(),
            )
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &AppRunnerConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_probe(project: &Path, config: &Path, json: bool) -> Result<i32> {
    let cfg = load_config(config)?;
    let factories = factories(&cfg)?;
    let Some((factory, runner)) = probe_all(&factories, project) else {
        eprintln!("no supported build tool found in {}", project.display());
        return Ok(exit_codes::NOT_APPLICABLE);
    };

    if json {
        let report = ProbeReport {
            project: runner.project_root(),
            builder: factory.to_string(),
            goals: runner.goals(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize probe report")?
        );
    } else {
        println!("{factory} ({})", runner.goals().join(" "));
    }
    Ok(exit_codes::OK)
}

fn cmd_run(
    project: &Path,
    cfg: &AppRunnerConfig,
    build_log: Option<&Path>,
    console_log: Option<&Path>,
) -> Result<i32> {
    let factories = factories(cfg)?;
    let Some((factory, runner)) = probe_all(&factories, project) else {
        eprintln!("no supported build tool found in {}", project.display());
        return Ok(exit_codes::NOT_APPLICABLE);
    };
    info!(project = %runner.project_root().display(), builder = %factory, "project claimed");

    let build_sink = sink_with_file(Arc::new(|line: &str| eprintln!("{line}")), build_log)?;
    let console_sink = sink_with_file(Arc::new(|line: &str| println!("{line}")), console_log)?;
    let waiter = cfg.startup.waiter()?;

    runner.start(&*build_sink, console_sink, &cfg.env, waiter.as_ref())?;
    let handle = runner
        .process()
        .context("no process handle after a successful start")?;
    eprintln!("started {} (pid {})", handle.command(), handle.pid());

    let status = handle.wait();
    runner.shutdown();
    if status.success() {
        Ok(exit_codes::OK)
    } else {
        eprintln!("application exited with {status}");
        Ok(exit_codes::APP_FAILED)
    }
}

/// Known build-tool families, in the order they are tried.
fn factories(cfg: &AppRunnerConfig) -> Result<Vec<Box<dyn RunnerFactory>>> {
    let factories: Vec<Box<dyn RunnerFactory>> =
        vec![Box::new(MavenRunnerFactory::from_config(cfg)?)];
    Ok(factories)
}

fn sink_with_file(terminal: SharedSink, file: Option<&Path>) -> Result<SharedSink> {
    let Some(path) = file else {
        return Ok(terminal);
    };
    let file_sink: SharedSink = Arc::new(FileSink::create(path)?);
    Ok(Arc::new(TeeSink::new(vec![terminal, file_sink])))
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}
