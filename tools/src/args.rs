use clap::{ArgAction, CommandFactory, Parser};
use clap_complete::Shell;
use pmexplain_common::errors::*;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Verbose logging
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub verbose: u8,
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Bypass tty detection and always use colors
    #[arg(short = 'C', long, global = true)]
    pub color: bool,
    /// Ubuntu series to query, defaults to the current development series
    #[arg(long, global = true)]
    pub series: Option<String>,
    /// Download the excuses even if the cached copy is recent enough
    #[arg(long, global = true)]
    pub refresh: bool,
    /// Print diagnostics as json lines
    #[arg(long)]
    pub json: bool,
    /// Don't fetch or search the hints branch
    #[arg(long)]
    pub no_hints: bool,
    /// Source package to explain, prompts for one if omitted
    pub package: Option<String>,
    #[command(subcommand)]
    pub subcommand: Option<SubCommand>,
}

#[derive(Debug, Parser)]
pub enum SubCommand {
    /// List packages that are stuck in -proposed, oldest first
    Candidates(Candidates),
    /// Generate shell completions
    Completions(Completions),
}

#[derive(Debug, Parser)]
pub struct Candidates {
    /// Only show the first N packages
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct Completions {
    pub shell: Shell,
}

pub fn gen_completions(args: &Completions) -> Result<()> {
    clap_complete::generate(
        args.shell,
        &mut Args::command(),
        "pmexplain",
        &mut io::stdout(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn parse_package() {
        let args = Args::try_parse_from(["pmexplain", "-vv", "--series", "noble", "foo"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.series.as_deref(), Some("noble"));
        assert_eq!(args.package.as_deref(), Some("foo"));
        assert!(args.subcommand.is_none());
    }

    #[test]
    fn parse_candidates() {
        let args = Args::try_parse_from(["pmexplain", "--refresh", "candidates", "--limit", "5"]).unwrap();
        assert!(args.refresh);
        assert!(args.package.is_none());
        match args.subcommand {
            Some(SubCommand::Candidates(candidates)) => {
                assert_eq!(candidates.limit, Some(5));
                assert!(!candidates.json);
            }
            other => panic!("unexpected subcommand: {:?}", other),
        }
    }
}
