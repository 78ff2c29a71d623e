use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "split-decision")]
#[command(version)]
#[command(about = "Deterministic A/B experiment engine for progressive rollouts")]
pub struct Args {
    /// Experiment definition file (TOML, one [[experiment]] table per experiment)
    pub file: PathBuf,

    /// Print machine-readable JSON instead of a coloured summary
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check every definition in the file without starting anything
    Validate,

    /// Show which variant a user would see in an experiment
    Assign {
        /// Experiment id
        #[arg(long, short)]
        experiment: String,

        /// User id to bucket
        #[arg(long, short)]
        user: String,
    },

    /// Start every experiment, push synthetic traffic through it and analyze it
    Simulate {
        /// Number of synthetic users per experiment
        #[arg(long, default_value = "10000")]
        users: usize,

        /// Seed for the outcome generator
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Only simulate this experiment id
        #[arg(long, short)]
        experiment: Option<String>,
    },
}

/// Exit code for a run in which some definitions failed.
pub fn exit_code(failures: usize) -> i32 {
    if failures == 0 { 0 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_validate() {
        let args = Args::try_parse_from(["split-decision", "exp.toml", "validate"]).unwrap();
        assert_eq!(args.file, PathBuf::from("exp.toml"));
        assert_eq!(args.command, Command::Validate);
        assert!(!args.json);
    }

    #[test]
    fn test_parse_assign() {
        let args = Args::try_parse_from([
            "split-decision", "exp.toml", "assign", "-e", "checkout", "--user", "user-42",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::Assign { experiment: "checkout".into(), user: "user-42".into() }
        );
    }

    #[test]
    fn test_parse_simulate_defaults() {
        let args = Args::try_parse_from(["split-decision", "exp.toml", "simulate", "--json"]).unwrap();
        assert!(args.json);
        assert_eq!(
            args.command,
            Command::Simulate { users: 10_000, seed: 42, experiment: None }
        );
    }

    #[test]
    fn test_assign_requires_user() {
        assert!(Args::try_parse_from(["split-decision", "exp.toml", "assign", "-e", "x"]).is_err());
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(0), 0);
        assert_eq!(exit_code(3), 1);
    }
}
