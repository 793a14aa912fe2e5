pub mod blueprints;
pub mod connect;
pub mod decode;
pub mod fetch;
pub mod property_sets;
pub mod systems;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use snmpkey_common::config::{Config, DEFAULT_PROPERTY_SET};
use snmpkey_core::property_sets::WritePolicy;

#[derive(Parser)]
#[command(name = "snmpkey", version)]
#[command(about = "Retrieve SNMPv3 keys from controller managed switches.")]
pub struct CommandLine {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct ConnectionArgs {
    /// Controller address, with or without scheme
    #[arg(short, long, env = "APSTRA_SERVER", global = true)]
    pub server: Option<String>,

    #[arg(short, long, env = "APSTRA_USERNAME", global = true)]
    pub username: Option<String>,

    /// Prompted for when not given
    #[arg(short, long, env = "APSTRA_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Accept self-signed controller certificates
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Per request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30, global = true)]
    pub timeout: u64,
}

impl ConnectionArgs {
    pub fn config(&self) -> Config {
        Config {
            request_timeout: Duration::from_secs(self.timeout.max(1)),
            verify_tls: !self.insecure,
            ..Config::default()
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the blueprints of the controller
    #[command(alias = "b")]
    Blueprints,
    /// List the switch systems of a blueprint
    #[command(alias = "s")]
    Systems {
        /// Blueprint id or label
        #[arg(short, long)]
        blueprint: Option<String>,
    },
    /// Retrieve and decode the SNMPv3 keys of a blueprint's switches
    #[command(alias = "f")]
    Fetch(FetchArgs),
    /// List, show and upload controller property sets
    #[command(alias = "p", subcommand)]
    PropertySets(PropertySetCommand),
    /// Decode raw key lines without talking to a controller
    #[command(alias = "d")]
    Decode {
        /// JSON format table replacing the built-in one
        #[arg(long, value_name = "FILE")]
        formats: Option<PathBuf>,

        #[arg(required = true)]
        lines: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum PropertySetCommand {
    /// List the property sets of the controller
    #[command(alias = "ls")]
    List,
    /// Show the values of one property set
    Show {
        /// Property set id or label
        selector: String,

        /// Also write the values to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Upload a JSON object as the values of a property set
    Push {
        name: String,

        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        write: WriteArgs,
    },
}

/// What to do when the target property set already exists. Left alone by default.
#[derive(Args)]
pub struct WriteArgs {
    /// Replace the values of an existing property set
    #[arg(long, conflicts_with = "merge")]
    pub overwrite: bool,

    /// Merge into an existing property set, keeping entries this run did not produce
    #[arg(long)]
    pub merge: bool,
}

impl WriteArgs {
    pub fn policy(&self) -> WritePolicy {
        if self.merge {
            WritePolicy::Merge
        } else if self.overwrite {
            WritePolicy::Overwrite
        } else {
            WritePolicy::SkipExisting
        }
    }
}

#[derive(Args)]
pub struct FetchArgs {
    /// Blueprint id or label
    #[arg(short, long, conflicts_with = "all_blueprints")]
    pub blueprint: Option<String>,

    /// Restrict the run to these system node ids. Repeatable
    #[arg(short, long = "device", value_name = "ID", conflicts_with = "all_blueprints")]
    pub devices: Vec<String>,

    /// Process every blueprint. Property sets are named `<label>-<NAME>`
    #[arg(short, long)]
    pub all_blueprints: bool,

    #[arg(short, long, value_name = "FILE", default_value = "results.json")]
    pub output: PathBuf,

    #[arg(short, long, default_value_t = 8)]
    pub concurrency: usize,

    /// JSON format table replacing the built-in one
    #[arg(long, value_name = "FILE")]
    pub formats: Option<PathBuf>,

    /// Store the retrieved keys in this property set
    #[arg(long, value_name = "NAME", num_args = 0..=1, default_missing_value = DEFAULT_PROPERTY_SET)]
    pub property_set: Option<String>,

    #[command(flatten)]
    pub write: WriteArgs,

    /// Command run on every device instead of the default one
    #[arg(long)]
    pub command: Option<String>,

    /// Seconds between two polls of a running command
    #[arg(long, value_name = "SECS", default_value_t = 3)]
    pub poll_interval: u64,

    /// Polls before a command counts as timed out
    #[arg(long, value_name = "N", default_value_t = 30)]
    pub max_polls: u32,
}

impl FetchArgs {
    pub fn apply(&self, mut cfg: Config) -> Config {
        cfg.concurrency = self.concurrency.max(1);
        cfg.poll_interval = Duration::from_secs(self.poll_interval);
        cfg.max_poll_attempts = self.max_polls.max(1);
        if let Some(command) = &self.command {
            cfg.command = command.clone();
        }
        if let Some(name) = &self.property_set {
            cfg.property_set_name = name.clone();
        }
        cfg
    }
}

/// How a command that did not hit a fatal error ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// Finished, but at least one device or the write-back failed.
    Partial,
}

impl Outcome {
    pub fn status(self) -> u8 {
        match self {
            Outcome::Complete => 0,
            Outcome::Partial => 2,
        }
    }

    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.status())
    }

    /// The worse of two outcomes.
    pub fn and(self, other: Outcome) -> Outcome {
        if self == Outcome::Complete { other } else { self }
    }
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
