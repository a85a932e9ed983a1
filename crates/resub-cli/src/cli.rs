use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "resub",
    about = "Reputation substrate kernel: run, verify, and inspect transaction logs",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Boot a kernel and execute a JSON transaction script
    Run(RunArgs),
    /// Import an export, replay it, and report integrity
    Verify(VerifyArgs),
    /// Summarize an export without replaying it
    Inspect(InspectArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// JSON array of `{"type": ..., "payload": ...}` steps
    pub script: PathBuf,
    /// Kernel configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// 32-byte identity seed, hex encoded
    #[arg(long)]
    pub seed: Option<String>,
    /// Write the kernel export here when the script finishes
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub export: PathBuf,
    /// Seed of the identity that produced the export
    #[arg(long)]
    pub seed: Option<String>,
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct InspectArgs {
    pub export: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run() {
        let cli = Cli::try_parse_from(["resub", "run", "script.json"]).unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.script, PathBuf::from("script.json"));
            assert!(args.seed.is_none());
            assert!(args.export.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_run_with_options() {
        let cli = Cli::try_parse_from([
            "resub",
            "run",
            "s.json",
            "--config",
            "kernel.toml",
            "--seed",
            "ab",
            "--export",
            "out.json",
        ])
        .unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.config, Some(PathBuf::from("kernel.toml")));
            assert_eq!(args.seed.as_deref(), Some("ab"));
            assert_eq!(args.export, Some(PathBuf::from("out.json")));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_verify() {
        let cli = Cli::try_parse_from(["resub", "verify", "out.json", "--seed", "00"]).unwrap();
        assert!(matches!(cli.command, Command::Verify(_)));
    }

    #[test]
    fn parse_inspect() {
        let cli = Cli::try_parse_from(["resub", "inspect", "out.json"]).unwrap();
        assert!(matches!(cli.command, Command::Inspect(_)));
    }

    #[test]
    fn script_is_required() {
        assert!(Cli::try_parse_from(["resub", "run"]).is_err());
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["resub", "--verbose", "inspect", "x"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["resub", "inspect", "x", "--format", "json"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
