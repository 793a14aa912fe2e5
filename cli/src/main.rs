mod commands;
mod export;
mod terminal;

use std::process::ExitCode;

use commands::{CommandLine, Commands, blueprints, decode, fetch, property_sets, systems};
use terminal::{logging, print};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let commands = CommandLine::parse_args();

    logging::init(commands.verbose);

    let outcome = match commands.command {
        Commands::Blueprints => {
            print::header("controller blueprints");
            blueprints::blueprints(&commands.connection).await
        }
        Commands::Systems { blueprint } => {
            print::header("switch systems");
            systems::systems(&commands.connection, blueprint.as_deref()).await
        }
        Commands::Fetch(args) => {
            print::header("snmp key retrieval");
            fetch::fetch(&commands.connection, &args).await
        }
        Commands::PropertySets(command) => {
            print::header("property sets");
            property_sets::property_sets(&commands.connection, &command).await
        }
        Commands::Decode { formats, lines } => {
            print::header("offline decode");
            decode::decode(formats.as_deref(), &lines)
        }
    };

    match outcome {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
