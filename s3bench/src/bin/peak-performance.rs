//! Prints the peak operation rates found in one or more benchmark logs.
//!
//! Usage: `peak-performance <log>...`

fn main() -> anyhow::Result<()> {
    s3bench::cli::analyze()
}
