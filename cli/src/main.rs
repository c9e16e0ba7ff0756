//! Command-line interface for the capture router.
//!
//! This CLI tool talks to a running capture-server:
//! - route: Decide where a capture belongs
//! - capture: Route a capture and feed the idea incubator
//! - act: Answer a routing decision (use, open, create, save, skip)
//! - registry: Inspect and edit topic → notebook mappings
//! - queue: Inspect and drive the export queue
//! - ideas: Manage notebook suggestions and cooldowns
//!
//! Configuration via environment:
//! - CAPTURE_URL: Base URL of the capture server (default: http://localhost:3000)

mod commands;

use clap::{Parser, Subcommand};

use commands::{
    act::ActArgs, ideas::IdeasArgs, queue::QueueArgs, registry::RegistryArgs, route::RouteArgs,
};

/// Capture router CLI
///
/// Route captured fragments to notebooks from the command line. Prints JSON
/// by default; pass --human for formatted output.
#[derive(Parser)]
#[command(name = "capture")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output human-readable formatted text instead of JSON
    #[arg(long, global = true)]
    human: bool,

    /// Capture server URL
    #[arg(
        long,
        env = "CAPTURE_URL",
        default_value = "http://localhost:3000",
        global = true
    )]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide which notebook a capture belongs to
    Route(RouteArgs),

    /// Route a capture and record it for idea suggestions
    Capture(RouteArgs),

    /// Apply a routing action
    Act(ActArgs),

    /// Manage the topic registry
    Registry(RegistryArgs),

    /// Manage the export queue
    Queue(QueueArgs),

    /// Manage idea suggestions and cooldowns
    Ideas(IdeasArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let client = match commands::build_client() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let base_url = cli.url.trim_end_matches('/');

    let result = match cli.command {
        Commands::Route(args) => commands::route::route(&client, base_url, cli.human, args).await,
        Commands::Capture(args) => {
            commands::route::capture(&client, base_url, cli.human, args).await
        }
        Commands::Act(args) => commands::act::execute(&client, base_url, cli.human, args).await,
        Commands::Registry(args) => {
            commands::registry::execute(&client, base_url, cli.human, args).await
        }
        Commands::Queue(args) => {
            commands::queue::execute(&client, base_url, cli.human, args).await
        }
        Commands::Ideas(args) => {
            commands::ideas::execute(&client, base_url, cli.human, args).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
