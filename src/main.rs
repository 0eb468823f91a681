use anyhow::{Context, Result};
use clap::Parser;
use svcwait::app::App;
use svcwait::cli::Cli;
use svcwait::{
    PollRequest, PollResult, ReadinessError, ReadinessPoller, Report, ServiceDetector, Settings,
    ShellRunner,
};
use tracing::{debug, error};

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    let settings = cli.apply(settings);
    let request = cli.request(&settings);

    if cli.check {
        debug!("check mode requested, polling is read-only either way");
    }

    let detector = ServiceDetector::from_settings(ShellRunner, &settings);
    let poller = ReadinessPoller::new(detector).interval(settings.poll_interval());

    let outcome = if cli.tui {
        run_tui(&poller, &request)?
    } else {
        poller.poll(&request)
    };

    match outcome {
        Ok(result) => {
            let report = Report::new(&request.service_name, &result);
            println!("{}", serde_json::to_string(&report)?);
            Ok(0)
        }
        Err(err) => {
            error!(unit = %request.service_name, kind = err.kind(), "{err}");
            println!(
                "{}",
                serde_json::to_string(&err.report(&request.service_name))?
            );
            Ok(1)
        }
    }
}

fn run_tui(
    poller: &ReadinessPoller<ShellRunner>,
    request: &PollRequest,
) -> Result<Result<PollResult, ReadinessError>> {
    let mut terminal = ratatui::init();
    let outcome = App::new(request).run(&mut terminal, poller, request);
    ratatui::restore();
    outcome
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if cli.tui {
        // The terminal belongs to the live view; keep log lines out of it.
        let log_path = std::env::temp_dir().join("svcwait.log");
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to open {}", log_path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(log_file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}
