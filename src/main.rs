//! Stepwise - hierarchical test runner
//!
//! Runs the bundled sample suites and reports their result trees.
//!
//! ## Usage
//!
//! ```bash
//! # Run every sample with a summary report
//! stepwise run --format summary
//!
//! # Run one sample and fail on any nested failure
//! stepwise run --sample database --strict
//!
//! # List samples with their suite outlines
//! stepwise list --detailed
//!
//! # Write a default configuration file
//! stepwise config init stepwise.yaml
//! ```

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use tracing::info;

use stepwise::config::{self, env, AppConfig};
use stepwise::output::{OutputFormat, ReportFormatter};
use stepwise::results::{EventLog, ReportPolicy, RunReport};
use stepwise::samples::{flat_suite, nested_suite, Sample};
use stepwise::utils::{init_logger, LogLevel};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        cli::Command::Run(run_args) => {
            run_samples(run_args, args.verbose).await?;
        }
        cli::Command::List(list_args) => {
            init_logger(verbosity(args.verbose, LogLevel::Info));
            list_samples(list_args)?;
        }
        cli::Command::Config(config_args) => {
            init_logger(verbosity(args.verbose, LogLevel::Info));
            manage_config(config_args)?;
        }
    }

    Ok(())
}

fn verbosity(verbose: bool, configured: LogLevel) -> LogLevel {
    if verbose {
        LogLevel::Debug
    } else {
        configured
    }
}

async fn run_samples(args: cli::RunArgs, verbose: bool) -> Result<()> {
    let mut config = config::file::resolve(args.config.as_deref())?;
    if let Some(max_concurrent) = args.max_concurrent {
        config.max_concurrent = max_concurrent;
    }
    if args.strict {
        config.fail_on_nested_failure = true;
    }
    init_logger(verbosity(verbose, config.log_level()));

    let samples = if args.sample.eq_ignore_ascii_case("all") {
        Sample::all()
    } else {
        let sample = Sample::from_str(&args.sample)
            .ok_or_else(|| anyhow!("Unknown sample: {}", args.sample))?;
        vec![sample]
    };
    let format = OutputFormat::from_str(&args.format)
        .ok_or_else(|| anyhow!("Unknown output format: {}", args.format))?;
    let policy = config.report_policy();

    info!(
        "Running {} sample(s) [max_concurrent={}, policy={}]",
        samples.len(),
        config.max_concurrent,
        policy
    );

    let mut reports = Vec::with_capacity(samples.len());
    for sample in samples {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        let events = if args.events { Some(sender) } else { None };
        let report = sample.run(&config, events).await?;
        info!("Sample {}: {}", sample, report);

        if args.events {
            let log = EventLog::collect(receiver);
            eprintln!("{}", log.to_json_lines()?);
        }
        reports.push((sample.name(), report));
    }

    let report = RunReport::merge(reports);
    let formatter = ReportFormatter::new(format).with_policy(policy);
    formatter.write(&mut std::io::stdout(), &report)?;

    if !report.is_success(policy) {
        std::process::exit(1);
    }
    Ok(())
}

fn list_samples(args: cli::ListArgs) -> Result<()> {
    println!("\nAvailable samples\n");

    for sample in Sample::all() {
        println!("  {:14} {}", sample.name(), sample.description());

        if args.detailed {
            let outline = match sample {
                Sample::Database => vec!["database".to_string()],
                Sample::UsersNested => nested_suite()?.outline(),
                Sample::UsersFlat => flat_suite()?.outline(),
            };
            for line in outline {
                println!("      {line}");
            }
            println!();
        }
    }

    println!();
    println!("Policies: {} (default), {}", ReportPolicy::RootsOnly, ReportPolicy::Strict);
    println!(
        "Formats:  {}",
        OutputFormat::all()
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

fn manage_config(args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        cli::ConfigAction::Show { config } => {
            let resolved = config::file::resolve(config.as_deref())?;
            println!("{}", serde_yaml::to_string(&resolved)?);

            let env_config = env::EnvConfig::load();
            if env_config.has_any() {
                env_config.print_summary();
            }
        }

        cli::ConfigAction::Init { path, force } => {
            if path.exists() && !force {
                bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }

            AppConfig::default().save(&path)?;
            println!("✓ Configuration file created: {}", path.display());
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Env => {
            env::print_env_help();
        }
    }

    Ok(())
}
