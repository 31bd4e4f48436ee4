//! Build script for the textscan CLI
//!
//! Records build metadata via `built` and composes the long `--version` text.

use std::env;

fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let host = env::var("HOST").unwrap_or_else(|_| "unknown".to_string());
    let commit = env::var("GIT_COMMIT_HASH").unwrap_or_else(|_| "unknown".to_string());
    let built_at = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

    println!(
        "cargo:rustc-env=TEXTSCAN_LONG_VERSION={version} (commit {commit}, built {built_at} on {host})"
    );
    println!("cargo:rerun-if-env-changed=GIT_COMMIT_HASH");
}
