use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "wakebot", version, about = "Robot alarm clock CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Alarm management
    Alarm {
        #[command(subcommand)]
        action: commands::alarm::AlarmAction,
    },
    /// Show the next alarm
    Next {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Challenge question management
    Question {
        #[command(subcommand)]
        action: commands::question::QuestionAction,
    },
    /// Dismissal statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Talk to the robot
    Device {
        /// Peer name (defaults to device.name)
        #[arg(long, global = true)]
        peer: Option<String>,
        #[command(subcommand)]
        action: commands::device::DeviceAction,
    },
    /// Run the alarm clock in the foreground
    Run {
        /// Peer name (defaults to device.name)
        #[arg(long)]
        peer: Option<String>,
    },
    /// Ring now and run a dismissal session
    Ring {
        /// Use an in-memory robot instead of a paired one
        #[arg(long)]
        simulate: bool,
        /// Peer name (defaults to device.name)
        #[arg(long)]
        peer: Option<String>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("WAKEBOT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Alarm { action } => commands::alarm::run(action),
        Commands::Next { json } => commands::next::run(json),
        Commands::Question { action } => commands::question::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Device { peer, action } => commands::device::run(action, peer),
        Commands::Run { peer } => commands::run::run(peer),
        Commands::Ring { simulate, peer } => commands::ring::run(simulate, peer),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
