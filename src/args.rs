use crate::{checker::Op, logging::parse_level, suites::CaseLabel};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use http::Uri;
use slog::Level;
use std::{net::SocketAddr, path::PathBuf, str::FromStr};

fn parse_number_impl(n: &str) -> Option<u64> {
    let mut chars = n.chars();
    let mut result = chars.next()?.to_digit(10)? as u64;

    while let Some(c) = chars.next() {
        if let Some(v) = c.to_digit(10) {
            result = result.checked_mul(10)?.checked_add(v as u64)?;
        } else if c != '_' {
            let power = "kMBT".find(c)? as u32 + 1;
            let multiplier = match chars.next() {
                Some('i') => 1024u64.pow(power),
                Some(_) => return None,
                None => 1000u64.pow(power),
            };
            return result.checked_mul(multiplier);
        }
    }

    Some(result)
}

fn parse_number(n: &str) -> Result<usize, String> {
    parse_number_impl(n)
        .and_then(|v| v.try_into().ok())
        .ok_or_else(|| format!("Invalid number: {n}"))
}

fn parse_op(op: &str) -> Result<Op, String> {
    match Op::from_str(op) {
        Ok(Op::Unknown) | Err(_) => Err(format!("Unknown op: {op}")),
        Ok(op) => Ok(op),
    }
}

/// Where checkers and cases send their calls.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// The in-process client; faults are injected by the harness itself.
    Memory,
    Remote(Uri),
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "memory" {
            return Ok(Target::Memory);
        }
        Uri::from_str(s)
            .map(Target::Remote)
            .map_err(|e| format!("Invalid target '{s}': {e}"))
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelArg {
    Smoke,
    L2,
    All,
}

impl LabelArg {
    pub fn labels(&self) -> Vec<CaseLabel> {
        match self {
            LabelArg::Smoke => vec![CaseLabel::Smoke],
            LabelArg::L2 => vec![CaseLabel::L2],
            LabelArg::All => vec![],
        }
    }
}

#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Args {
    /// Log level: trace, debug, info, warning, error or critical
    #[clap(long, default_value = "info", value_parser = parse_level, global = true)]
    pub log_level: Level,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug)]
pub struct TargetArgs {
    /// Database URI, or "memory" for the in-process client
    #[clap(short, long, default_value = "http://localhost:9001")]
    pub uri: Target,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run checkers through the phases of a chaos scenario
    Chaos(ChaosArgs),
    /// Run the functional has_collection cases
    Smoke(SmokeArgs),
}

#[derive(ClapArgs, Debug)]
pub struct ChaosArgs {
    #[clap(flatten)]
    pub target: TargetArgs,

    /// JSON file overriding checker tunables
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// JSON file describing the phases; defaults to before/during/after chaos
    #[clap(short, long)]
    pub scenario: Option<PathBuf>,

    /// Ops to check, comma separated
    #[clap(long, value_delimiter = ',', value_parser = parse_op,
        default_value = "create,insert,flush,index,search,query")]
    pub ops: Vec<Op>,

    /// Length of each default phase, in seconds
    #[clap(long, default_value = "60", value_parser = parse_number)]
    pub phase_secs: usize,

    /// Rows inserted into every checker collection
    #[clap(long, value_parser = parse_number)]
    pub entities: Option<usize>,

    /// Number of 9 digits to show in p99* results
    #[clap(long, default_value_t = 2, value_parser = parse_number)]
    pub p9: usize,

    /// Serve live counters at this address
    #[clap(long)]
    pub status_addr: Option<SocketAddr>,

    /// Hide the phase progress bar
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}

#[derive(ClapArgs, Debug)]
pub struct SmokeArgs {
    #[clap(flatten)]
    pub target: TargetArgs,

    /// Which cases to run
    #[clap(short, long, value_enum, default_value = "all")]
    pub label: LabelArg,
}

pub fn parse_args() -> Args {
    Args::parse()
}
