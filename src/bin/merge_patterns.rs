use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use interchange::pattern::merge::{merge_chunk_files, save_merged};
use log::info;

extern crate interchange;

#[derive(Parser)]
struct MergeArgs {
    /// Build directory holding the chunk files.
    #[arg(short, long)]
    dir: PathBuf,
    /// Number of chunks the build was partitioned into.
    #[arg(long)]
    chunks: usize,
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();
    let args = MergeArgs::parse();
    if args.chunks == 0 {
        bail!("--chunks must be at least 1");
    }
    let merged = merge_chunk_files(&args.dir, args.chunks)?;
    let path = save_merged(&args.dir, &merged)?;
    info!(
        "Merged {} transfer patterns into {}",
        merged.transfer_patterns().len(),
        path.display()
    );
    Ok(())
}
