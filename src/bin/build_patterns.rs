use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use interchange::build::{build_chunk, BuildOptions};
use interchange::pattern::merge::save_chunk;
use interchange::scenario::DelayPolicy;
use interchange::street::CrowFlightRouter;
use interchange::timetable::in_memory::InMemoryTimetable;
use log::info;

extern crate interchange;

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    None,
    Simple,
    RestrictedSimple,
    PowerSet,
}

#[derive(Parser)]
struct BuildArgs {
    /// Serialized timetable graph to build against.
    #[arg(short, long)]
    input: PathBuf,
    /// Directory receiving the chunk files.
    #[arg(short, long)]
    build_dir: PathBuf,
    /// Number of chunks the stop set is partitioned into.
    #[arg(long, default_value_t = 1)]
    chunks: usize,
    /// 1-based chunk to build; all of them when omitted.
    #[arg(long)]
    chunk: Option<usize>,
    #[arg(long, value_enum, default_value_t = PolicyArg::Simple)]
    delay_policy: PolicyArg,
    /// Scenario bound for the restricted-simple and power-set policies.
    #[arg(long, default_value_t = 8)]
    policy_limit: usize,
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();
    let args = BuildArgs::parse();
    if args.chunks == 0 {
        bail!("--chunks must be at least 1");
    }
    if let Some(chunk) = args.chunk {
        if chunk == 0 || chunk > args.chunks {
            bail!("--chunk must be within 1..={}", args.chunks);
        }
    }

    let view = InMemoryTimetable::open(&args.input)?;
    let streets = CrowFlightRouter::default();
    let options = BuildOptions {
        chunks: args.chunks,
        policy: match args.delay_policy {
            PolicyArg::None => DelayPolicy::None,
            PolicyArg::Simple => DelayPolicy::Simple,
            PolicyArg::RestrictedSimple => DelayPolicy::RestrictedSimple(args.policy_limit),
            PolicyArg::PowerSet => DelayPolicy::PowerSet(args.policy_limit),
        },
        ..BuildOptions::default()
    };

    let chunks: Vec<usize> = match args.chunk {
        Some(chunk) => vec![chunk],
        None => (1..=args.chunks).collect(),
    };
    for chunk in chunks {
        let index = build_chunk(&view, &streets, &options, chunk)?;
        let path = save_chunk(&args.build_dir, chunk, args.chunks, &index)?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}
