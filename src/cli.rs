//! CLI argument parsing for the user-import-worker binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "user-import-worker", about = "User directory import worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run one import from a JSON file and print the report
    Import {
        /// Path to an import request JSON file
        #[arg(long)]
        file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_import_command_parses() {
        let cli = Cli::parse_from(["user-import-worker", "import", "--file", "users.json"]);
        match cli.command {
            Some(Command::Import { file }) => assert_eq!(file, PathBuf::from("users.json")),
            _ => panic!("expected import command"),
        }
    }

    #[test]
    fn test_cli_import_requires_file() {
        assert!(Cli::try_parse_from(["user-import-worker", "import"]).is_err());
    }

    #[test]
    fn test_cli_no_command_defaults_to_none() {
        let cli = Cli::parse_from(["user-import-worker"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_serve_command_parses() {
        let cli = Cli::parse_from(["user-import-worker", "serve"]);
        assert!(matches!(cli.command, Some(Command::Serve)));
    }
}
