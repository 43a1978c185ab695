use std::{env, process::Command};

/// Stamps the commit into `taskd --version` so a log line or a bug report
/// can be tied to the daemon build that produced it.
///
/// Source tarballs have no `.git`; packagers set `TASKD_GIT_SHA` instead.
fn main() {
    println!("cargo:rerun-if-env-changed=TASKD_GIT_SHA");
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let sha = env::var("TASKD_GIT_SHA")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(git_short_sha)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=TASKD_GIT_SHA={sha}");
}

fn git_short_sha() -> Option<String> {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
}
