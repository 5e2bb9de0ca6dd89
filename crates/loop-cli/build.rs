use std::env;
use std::process::Command;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Stamps `GIT_SHA` and `BUILD_DATE` into the binary for `loop-cli --version`.
fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    println!("cargo:rustc-env=GIT_SHA={}", git_sha().unwrap_or_else(|| "unknown".into()));
    println!("cargo:rustc-env=BUILD_DATE={}", build_date());
}

fn git_sha() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let sha = String::from_utf8(out.stdout).ok()?.trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

/// Honors `SOURCE_DATE_EPOCH` for reproducible builds.
fn build_date() -> String {
    let when = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);
    when.format(&Rfc3339)
        .unwrap_or_else(|_| "unknown-date".to_string())
}
