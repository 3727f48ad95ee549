use crate::demo::{run_demo, DemoArgs};
use crate::routes::transition_rules;
use crate::server;
use clap::{Args, Parser, Subcommand};
use rentguard::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "RentGuard",
    about = "Run and demonstrate the rental-guarantee policy lifecycle service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a policy from draft to active against in-memory storage
    Demo(DemoArgs),
    /// Print the status transition table
    Transitions,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Keep completed policies in COLLECTING_INFO until staff advance them
    #[arg(long)]
    pub(crate) manual_review: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Transitions => {
            print_transitions();
            Ok(())
        }
    }
}

fn print_transitions() {
    println!("Policy status transitions");
    for rule in transition_rules() {
        let targets = if rule.terminal {
            "(final)".to_string()
        } else {
            rule.allowed
                .iter()
                .map(|status| status.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!("  {:<24} -> {}", rule.from.as_str(), targets);
    }
}
