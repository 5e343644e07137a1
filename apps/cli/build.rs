use std::process::Command;

/// Trimmed stdout of a git command, if git is available and the call succeeds.
fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8(out.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    // `bubble-market --version` prints "<version> (<commit> <commit date>)".
    let commit = git(&["rev-parse", "--short=10", "HEAD"]).unwrap_or_else(|| "dev".to_string());
    let built = git(&["log", "-1", "--format=%cs"]).unwrap_or_else(|| "unreleased".to_string());
    println!("cargo:rustc-env=GIT_SHA={commit}");
    println!("cargo:rustc-env=BUILD_DATE={built}");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}
