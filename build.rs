use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Command;

fn main() {
    write_git_rev();
}

/// Write the short git hash of the build to ${OUT_DIR}/git-commit so
/// version.rs can include it.
fn write_git_rev() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dst_path = Path::new(&out_dir).join("git-commit");
    let mut f = File::create(&dst_path).unwrap();

    let commit_hash = Command::new("git")
        .args(&["rev-parse", "--short", "HEAD"])
        .output();
    let dirty = Command::new("git")
        .args(&["status", "--porcelain"])
        .output();

    match (commit_hash, dirty) {
        (Ok(ref hash), Ok(ref status)) if hash.status.success() && status.status.success() => {
            let hash = String::from_utf8_lossy(&hash.stdout);
            if !status.stdout.is_empty() {
                f.write_all(b"WIP ").unwrap();
            }
            f.write_all(hash.trim().as_bytes()).unwrap();
        }
        _ => f.write_all(b"unknown commit").unwrap(),
    }
}
