//! picompute CLI - distributed Monte Carlo estimation of Pi.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use picompute::{
    CapacityProvider, Config, ConvergenceController, CostEstimator, HttpInvoker, LocalInvoker,
    RunReport, RunRequest, ServiceCapacity, WorkerTarget,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "picompute")]
#[command(version)]
#[command(about = "Estimate Pi by Monte Carlo sampling across remote compute workers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "picompute.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an estimation
    Run {
        /// Service kind, as named under [services.<kind>]
        #[arg(long)]
        service: String,

        /// Number of parallel workers (R)
        #[arg(short = 'r', long)]
        workers: usize,

        /// Digits of Pi that must match (D)
        #[arg(short = 'd', long)]
        digits: u32,

        /// Total shots per round (S)
        #[arg(short = 's', long)]
        shots: u64,

        /// Shots per reported partial (Q)
        #[arg(short = 'q', long, default_value = "1000")]
        interval: u64,

        /// Write the JSON run report here (overrides output.report_path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sample in-process instead of calling remote workers
        #[arg(long)]
        local: bool,

        /// Seed for --local sampling
        #[arg(long, requires = "local")]
        seed: Option<u64>,

        /// Print every aggregate row
        #[arg(long)]
        table: bool,

        /// Release the service's workers when the run ends
        #[arg(long)]
        release: bool,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: a tracing subscriber was already installed");
    }
}

fn print_example_config() {
    let example = r#"# picompute configuration file

[coordinator]
# Maximum rounds per run, failed rounds included
max_retries = 10
# "half_even" or "half_away_from_zero"
rounding = "half_even"
# "all_attempts" bills discarded rounds too, "completed_rounds" does not
billing = "all_attempts"

[transport]
timeout_secs = 60

[output]
round_values_dp = 12  # at most 15
# report_path = "output/report.json"

[services.lambda]
# API key sent as x-api-key (can also use api_key = "${SOME_VAR}")
api_key_env = "PI_LAMBDA_API_KEY"
capacity = { mode = "elastic", endpoint = "https://example.execute-api.us-west-1.amazonaws.com/test/calculation", max_workers = 10 }
pricing = { model = "gb_second", memory_mb = 512, rate_per_gb_second = 0.0000166667 }

[services.ec2]
capacity = { mode = "fixed", hosts = ["http://10.0.0.1/calculation", "http://10.0.0.2/calculation"] }
pricing = { model = "hourly", rate_per_hour = 0.0116 }
"#;
    println!("{example}");
}

fn print_report(report: &RunReport, table: bool) {
    if table {
        println!(
            "\n{:>6}  {:>10}  {:>10}  {:>14}  {:>14}  {:>14}",
            "#", "in_circle", "shots", "cum_in_circle", "cum_shots", "estimate"
        );
        for row in &report.rows {
            println!(
                "{:>6}  {:>10}  {:>10}  {:>14}  {:>14}  {:>14.10}",
                row.sequence_number,
                row.in_circle,
                row.shots,
                row.cumulative_in_circle,
                row.cumulative_shots,
                row.running_pi_estimate
            );
        }
    }

    let r = &report.result;
    println!("\n=== Pi Estimation Complete ===");
    println!("Timestamp:   {}", r.timestamp.format("%Y-%m-%d %T"));
    println!("Estimate:    {}", r.estimated_pi);
    println!("Error:       {:e}", std::f64::consts::PI - r.estimated_pi);
    println!("Service:     {}", r.service_kind);
    println!("S / Q:       {} / {}", r.shots_requested, r.report_interval);
    println!("R / D:       {} / {}", r.worker_count, r.precision_digits);
    println!("Rounds:      {} ({} failed)", r.rounds_used, r.failed_rounds);
    println!("Rows:        {}", report.rows.len());
    println!("Duration:    {}s", r.total_duration_secs);
    println!("Cost:        ${}", r.total_cost);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            for kind in config.service_kinds() {
                config
                    .resolve_api_key(kind)
                    .with_context(|| format!("Failed to resolve API key for '{kind}'"))?;
            }

            info!("Configuration is valid");
            info!("  Services: {}", config.service_kinds().join(", "));
            info!("  Max rounds: {}", config.coordinator.max_retries);
            info!("  Rounding: {:?}", config.coordinator.rounding);
            info!("  Billing: {:?}", config.coordinator.billing);
            return Ok(());
        }

        Commands::Run {
            service,
            workers,
            digits,
            shots,
            interval,
            output,
            local,
            seed,
            table,
            release,
        } => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            let request = RunRequest {
                service_kind: service.clone(),
                worker_count: workers,
                precision_digits: digits,
                total_shots: shots,
                report_interval: interval,
            };
            request.validate()?;

            let estimator = CostEstimator::for_service(&config, &service)
                .context("Failed to set up cost estimation")?;

            let outcome = if local {
                let targets: Vec<WorkerTarget> = (0..workers).map(WorkerTarget::local).collect();
                let invoker = Arc::new(seed.map_or_else(LocalInvoker::new, LocalInvoker::seeded));

                ConvergenceController::new(invoker, config.coordinator.clone(), estimator)
                    .with_progress()
                    .run(&request, &targets)
                    .await
            } else {
                let capacity = ServiceCapacity::from_config(&config, &service)
                    .context("Failed to set up capacity provider")?;

                if let Err(e) = capacity.ensure_capacity(workers).await {
                    warn!(error = %e, "Capacity check failed");
                }
                let targets = capacity
                    .list_available_workers()
                    .await
                    .context("Failed to list available workers")?;

                let invoker = Arc::new(HttpInvoker::new(config.transport.timeout_secs)?);
                let outcome =
                    ConvergenceController::new(invoker, config.coordinator.clone(), estimator)
                        .with_progress()
                        .run(&request, &targets)
                        .await;

                if release {
                    capacity
                        .release_all_workers()
                        .await
                        .context("Failed to release workers")?;
                }
                outcome
            };

            let report = match outcome {
                Ok(report) => RunReport {
                    result: report.result.rounded(config.output.round_values_dp),
                    rows: report.rows,
                },
                Err(reason) => bail!("Run aborted: {reason}"),
            };

            print_report(&report, table);

            if let Some(path) = output.or(config.output.report_path) {
                report
                    .write_json(&path)
                    .with_context(|| format!("Failed to write report to {path:?}"))?;
                println!("Report:      {path:?}");
            }
        }
    }

    Ok(())
}
