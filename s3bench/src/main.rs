//! Runs the benchmark phases against the configured buckets.
//!
//! Usage: `s3bench [-c <config>] <object_count> <thread_count>`

fn main() -> anyhow::Result<()> {
    s3bench::cli::execute()
}
