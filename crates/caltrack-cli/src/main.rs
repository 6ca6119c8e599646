use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "caltrack", version, about = "Track time spent per topic from calendar events")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass against the calendar
    Sync(commands::sync::SyncArgs),
    /// Tracking key management
    Keys {
        #[command(subcommand)]
        action: commands::keys::KeysAction,
    },
    /// Tracking key categories
    Categories {
        #[command(subcommand)]
        action: commands::categories::CategoriesAction,
    },
    /// Browse and add matched events
    Events {
        #[command(subcommand)]
        action: commands::events::EventsAction,
    },
    /// Tracked time summary
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Calendars visible to the stored credential
    Calendars {
        #[command(subcommand)]
        action: commands::calendars::CalendarsAction,
    },
    /// Google credential management
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Print a shell completion script
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Sync(args) => commands::sync::run(args),
        Commands::Keys { action } => commands::keys::run(action),
        Commands::Categories { action } => commands::categories::run(action),
        Commands::Events { action } => commands::events::run(action),
        Commands::Stats { json } => commands::stats::run(json),
        Commands::Calendars { action } => commands::calendars::run(action),
        Commands::Auth { action } => commands::auth::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "caltrack", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
