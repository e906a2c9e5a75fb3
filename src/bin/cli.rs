use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use posture::checks::builtin;
use posture::config::Config;
use posture::output::OutputFormat;
use posture::RunOptions;

#[derive(Parser)]
#[command(
    name = "posture",
    about = "Cloud posture evaluator for network rule reachability",
    version,
    author
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every check against an inventory snapshot
    Run {
        /// Path to the JSON inventory file
        inventory: PathBuf,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Run testers one after another
        #[arg(long)]
        sequential: bool,

        /// Per-tester time budget in seconds (0 disables it)
        #[arg(long, env = "POSTURE_TESTER_TIMEOUT")]
        timeout: Option<u64>,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List all built-in checks
    ListChecks {
        /// Output format (table, json)
        #[arg(long, short = 'f', default_value = "table")]
        format: String,
    },

    /// Generate a starter .posture.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// `RUST_LOG` wins; otherwise the level follows `-v`.
    fn init_logging(&self) {
        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() {
    let cli = Cli::parse();
    cli.init_logging();

    let result = match cli.command {
        Commands::Run {
            inventory,
            config,
            format,
            sequential,
            timeout,
            output,
        } => cmd_run(inventory, config, format, sequential, timeout, output),
        Commands::ListChecks { format } => cmd_list_checks(format),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn cmd_run(
    inventory: PathBuf,
    config: Option<PathBuf>,
    format_str: String,
    sequential: bool,
    timeout: Option<u64>,
    output_path: Option<PathBuf>,
) -> Result<i32, posture::error::PostureError> {
    let format = OutputFormat::from_str_lenient(&format_str).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", format_str);
        OutputFormat::Console
    });

    let options = RunOptions {
        config_path: config,
        format,
        parallel_override: sequential.then_some(false),
        timeout_override: timeout,
    };

    let report = posture::run(&inventory, &options)?;
    let rendered = posture::render_report(&report, format)?;

    match output_path {
        Some(out) => std::fs::write(&out, &rendered)?,
        None => print!("{}", rendered),
    }

    // Exit code: 0 = pass, 1 = issues found or a tester failed
    Ok(if report.verdict.pass { 0 } else { 1 })
}

fn cmd_list_checks(format_str: String) -> Result<i32, posture::error::PostureError> {
    let checks = builtin::list_checks();

    match format_str.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&checks)?;
            println!("{}", json);
        }
        _ => {
            println!("{:<56} {:<6} {:<20} DESCRIPTION", "NAME", "SVC", "ITEM TYPE");
            println!("{}", "-".repeat(110));
            for check in &checks {
                println!(
                    "{:<56} {:<6} {:<20} {}",
                    check.name, check.service, check.item_type, check.description,
                );
            }
        }
    }

    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32, posture::error::PostureError> {
    let path = PathBuf::from(".posture.toml");

    if path.exists() && !force {
        eprintln!(".posture.toml already exists. Use --force to overwrite.");
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created .posture.toml");

    Ok(0)
}
