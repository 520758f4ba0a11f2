//! Embeds the commit and build time reported by `--version` and `/version`

use chrono::Utc;
use std::process::Command;

fn git_hash() -> Option<String> {
    // CI builds from a tarball pass the commit explicitly
    if let Ok(hash) = std::env::var("BLEND_DEPLOY_GIT_HASH") {
        return Some(hash);
    }

    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn main() {
    let git_hash = git_hash().unwrap_or_else(|| "unknown".to_string());
    let build_time = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=BUILD_TIME={}", build_time);

    println!("cargo:rerun-if-env-changed=BLEND_DEPLOY_GIT_HASH");
    println!("cargo:rerun-if-changed=../.git/HEAD");
}
