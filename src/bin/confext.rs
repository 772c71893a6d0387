//! In-container configuration extractor.
//!
//! Baked into the tool images and invoked over exec. Reads the tool's native
//! configuration file, merges `key=value` overrides, and prints one flat JSON
//! object on stdout. Fail-soft by contract: internal errors are emitted as
//! `{"error": ...}` with exit 0, so the caller's JSON scan always finds an
//! object to parse.

use clap::Parser;
use std::path::PathBuf;
use toolforge::extractor;

#[derive(Parser)]
#[command(
    name = "confext",
    about = "Read, merge, and emit tool configuration as JSON"
)]
struct Args {
    /// Native configuration file to read
    #[arg(long)]
    file: PathBuf,

    /// Persist the merged configuration back to the file
    #[arg(long)]
    write: bool,

    /// key=value overrides merged into the configuration
    overrides: Vec<String>,
}

fn main() {
    let args = Args::parse();

    let payload = match extractor::extract(&args.file, &args.overrides, args.write) {
        Ok(config) => serde_json::to_string(&config)
            .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {}"}}"#, e)),
        Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
    };

    println!("{}", payload);
}
