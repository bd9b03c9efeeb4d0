//! Forum ads CLI.
//!
//! This tool provides commands for:
//! - Validating engine configuration files
//! - Building the active-ads snapshot from a JSON fixture
//! - Simulating ad placement on a thread-list page

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod error;
mod fixture;
mod simulate;

use error::CliError;
use fixture::Fixture;

#[derive(Parser)]
#[command(name = "fadcli")]
#[command(about = "Forum ads CLI for configuration checks and placement simulation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Rebuild the active-ads snapshot from a fixture and print it
    Snapshot {
        /// Path to the JSON fixture
        #[arg(long)]
        fixture: PathBuf,

        /// Path to the TOML configuration file
        #[arg(long, short, env = "FORUM_ADS_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Simulate one thread-list page and print the rendered ads
    Render {
        /// Path to the JSON fixture
        #[arg(long)]
        fixture: PathBuf,

        /// HTML template with placeholders; each ad's own HTML when omitted
        #[arg(long, short)]
        template: Option<PathBuf>,

        /// Forum (node) id of the listed threads
        #[arg(long)]
        forum: u32,

        /// Number of threads on the page
        #[arg(long, default_value_t = 20)]
        threads: usize,

        /// Path to the TOML configuration file
        #[arg(long, short, env = "FORUM_ADS_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config against settings validation
    Validate {
        /// Path to the TOML configuration file
        #[arg(long, short)]
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(cli) {
        Ok(output) => println!("{}", output.trim_end()),
        Err(e) => {
            log::error!("{e}");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };

    let result = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply();

    if let Err(e) = result {
        eprintln!("Failed to initialize logger: {e}");
    }
}

fn run(cli: Cli) -> Result<String, CliError> {
    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Validate { file } => config::validate(&file, cli.verbose),
        },
        Commands::Snapshot { fixture, config } => {
            let settings = config::load_or_default(config.as_deref())?;
            let fixture = Fixture::load(&fixture)?;
            simulate::snapshot(&fixture, &settings)
        }
        Commands::Render {
            fixture,
            template,
            forum,
            threads,
            config,
        } => {
            let settings = config::load_or_default(config.as_deref())?;
            let fixture = Fixture::load(&fixture)?;
            let template = simulate::load_template(template.as_deref())?;

            let services = fixture.services();
            let snapshot = simulate::publish(&services, &settings)?;
            log::info!(
                "Published {} slots and {} ads",
                snapshot.slots.len(),
                snapshot.ad_count()
            );

            let render = simulate::render_thread_list(
                &services,
                &fixture.visitor,
                &settings,
                &template,
                forum,
                threads,
            );

            let mut output = String::new();
            for (index, ad_id) in &render.placements {
                output.push_str(&format!("thread {index}: ad {ad_id}\n"));
            }
            output.push_str(&format!("views logged: {}\n\n", render.views_logged));
            output.push_str(&render.html);
            Ok(output)
        }
    }
}
