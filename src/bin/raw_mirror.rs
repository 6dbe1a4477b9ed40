use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use raw_image_mirror::app::{App, RunOptions};
use raw_image_mirror::config::{ConfigLoader, FailurePolicy, ResolvedConfig};
use raw_image_mirror::error::MirrorError;
use raw_image_mirror::feed::HttpFeedClient;
use raw_image_mirror::output::{JsonOutput, OutputMode, StderrProgress};

#[derive(Parser)]
#[command(name = "raw-mirror")]
#[command(about = "Mirror the Mars 2020 raw-image feed into a local directory tree")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    snapshot_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Refresh the catalog if stale and download missing images (default)")]
    Run(RunArgs),
    #[command(about = "Show the current catalog snapshot")]
    Status,
}

#[derive(Args, Clone, Default, Debug)]
struct RunArgs {
    #[arg(long)]
    images_dir: Option<Utf8PathBuf>,

    #[arg(long, help = "Ignore any fresh snapshot and refetch the catalog")]
    refresh: bool,

    #[arg(long, help = "Report what would be downloaded without fetching images")]
    dry_run: bool,

    #[arg(long, help = "Stop after the catalog is loaded or refreshed")]
    skip_download: bool,

    #[arg(long, help = "Abort the whole batch on the first failed download")]
    fail_fast: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<MirrorError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &MirrorError) -> u8 {
    match error {
        MirrorError::DownloadsFailed { .. } => 4,
        error if error.is_transport() => 3,
        _ => 1,
    }
}

async fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(dir) = cli.snapshot_dir {
        config.snapshot_dir = dir;
    }

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run_mirror(args, config, output_mode).await,
        Commands::Status => run_status(config, output_mode),
    }
}

async fn run_mirror(
    args: RunArgs,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    if let Some(dir) = args.images_dir {
        config.images_dir = dir;
    }
    if args.fail_fast {
        config.failure_policy = FailurePolicy::FailFast;
    }
    config.validate()?;

    let client = HttpFeedClient::new(&config)?;
    let app = App::new(&config, client.clone(), client);
    let options = RunOptions {
        refresh: args.refresh,
        dry_run: args.dry_run,
        skip_download: args.skip_download,
    };

    let result = match output_mode {
        OutputMode::NonInteractive => {
            let result = app.run(options, &JsonOutput).await?;
            JsonOutput::print_run(&result).into_diagnostic()?;
            result
        }
        OutputMode::Interactive => {
            let result = app.run(options, &StderrProgress).await?;
            print_run_summary(&result);
            result
        }
    };

    match result.failure() {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn run_status(config: ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let client = HttpFeedClient::new(&config)?;
    let app = App::new(&config, client.clone(), client);
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.status(&JsonOutput)?;
            JsonOutput::print_status(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.status(&StderrProgress)?;
            println!("snapshots in {}: {}", result.snapshot_dir, result.snapshot_count);
            match result.current {
                Some(current) => println!(
                    "current: {} ({} entries, {}s old)",
                    current.path, current.entries, current.age_secs
                ),
                None => println!("current: none (next run fetches the catalog)"),
            }
        }
    }
    Ok(())
}

fn print_run_summary(result: &raw_image_mirror::app::RunResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}raw-mirror summary{reset}");
    println!(
        "{green}catalog: {} entries from {:?} ({}){reset}",
        result.entries, result.catalog_source, result.snapshot_path
    );
    let Some(report) = &result.downloads else {
        println!("{yellow}downloads skipped{reset}");
        return;
    };
    println!(
        "{green}downloaded: {} ({} bytes){reset}",
        report.downloaded, report.bytes
    );
    println!("{yellow}already present: {}{reset}", report.skipped);
    if report.planned > 0 {
        println!("{cyan}would download: {}{reset}", report.planned);
    }
    if !report.failures.is_empty() {
        println!("{red}failed: {}{reset}", report.failures.len());
        for failure in &report.failures {
            println!("{red}   {} {}: {}{reset}", failure.index, failure.url, failure.error);
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn status_accepts_snapshot_dir() {
        let cli = Cli::try_parse_from(["raw-mirror", "status", "--snapshot-dir", "snaps"]).unwrap();
        assert_eq!(cli.snapshot_dir, Some(Utf8PathBuf::from("snaps")));
        assert_matches!(cli.command, Some(Commands::Status));
    }

    #[test]
    fn run_accepts_config_after_subcommand() {
        let cli =
            Cli::try_parse_from(["raw-mirror", "run", "--config", "x.json", "--fail-fast"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("x.json"));
        assert_matches!(cli.command, Some(Commands::Run(args)) if args.fail_fast && !args.refresh);
    }

    #[test]
    fn images_dir_is_run_only() {
        assert!(Cli::try_parse_from(["raw-mirror", "status", "--images-dir", "img"]).is_err());
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(
            map_exit_code(&MirrorError::DownloadsFailed { failed: 1, total: 2 }),
            4
        );
        assert_eq!(map_exit_code(&MirrorError::FeedHttp("timed out".into())), 3);
        assert_eq!(map_exit_code(&MirrorError::InvalidConfig("page_size".into())), 1);
    }
}
