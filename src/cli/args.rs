//! CLI argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::bridge::PayloadProfile;
use crate::security::Profile;

#[derive(Parser, Debug)]
#[command(name = "scriptit")]
#[command(author, version, about = "Run untrusted scripts behind an allow-listed global scope", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubCommand,

    /// Sandbox settings file (TOML)
    #[arg(long, global = true, env = "SCRIPTIT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Run a script file (.js) and print its completion value
    Run {
        /// Path to the .js script file
        file: PathBuf,

        /// Script arguments in the form key=value, exposed as `args`
        #[arg(long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,

        /// Allow-list profile, overriding the settings file
        #[arg(long, value_enum)]
        profile: Option<Profile>,

        /// Payload encoding for host calls, overriding the settings file
        #[arg(long, value_enum)]
        payload: Option<PayloadProfile>,
    },

    /// Evaluate a single expression
    Eval {
        expression: String,

        #[arg(long, value_enum)]
        profile: Option<Profile>,
    },

    /// Outline and validate a script without running it
    Check {
        /// Path to the .js script file
        file: PathBuf,
    },

    /// Print the global names a profile exposes
    Allowlist {
        #[arg(long, value_enum)]
        profile: Option<Profile>,
    },

    /// Start interactive REPL mode
    Repl {
        /// Start REPL in a named container
        #[arg(long)]
        container: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let args = Args::try_parse_from([
            "scriptit", "run", "job.js", "--arg", "n=2", "--profile", "broad", "--payload", "binary", "--json",
        ])
        .unwrap();
        assert!(args.json);
        match args.command {
            SubCommand::Run { file, args, profile, payload } => {
                assert_eq!(file, PathBuf::from("job.js"));
                assert_eq!(args, vec!["n=2".to_string()]);
                assert_eq!(profile, Some(Profile::Broad));
                assert_eq!(payload, Some(PayloadProfile::Binary));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_profile() {
        assert!(Args::try_parse_from(["scriptit", "allowlist", "--profile", "wide"]).is_err());
    }
}
