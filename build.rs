use std::process::Command;

/// Run a command and return its trimmed stdout, or None on any failure.
fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn main() {
    let commit = capture("git", &["rev-parse", "--short", "HEAD"]);
    let built = capture("date", &["-u", "+%Y-%m-%d"]);
    // "rustc 1.92.0 (...)" -> "1.92.0"
    let rustc = capture("rustc", &["--version"]).and_then(|line| {
        line.strip_prefix("rustc ")
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string)
    });

    let unknown = || "unknown".to_string();
    println!(
        "cargo:rustc-env=ARGUS_COMMIT_SHA={}",
        commit.unwrap_or_else(unknown)
    );
    println!(
        "cargo:rustc-env=ARGUS_BUILD_DATE={}",
        built.unwrap_or_else(unknown)
    );
    println!(
        "cargo:rustc-env=ARGUS_RUSTC_VERSION={}",
        rustc.unwrap_or_else(unknown)
    );

    println!("cargo:rerun-if-changed=.git/HEAD");
}
