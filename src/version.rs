/// Short git hash of the build, written by build.rs.
static GIT_COMMIT: &str = include_str!(concat!(env!("OUT_DIR"), "/git-commit"));

pub fn print_version_info() {
    println!("daexport {}", env!("CARGO_PKG_VERSION"));
    println!("build commit: {}", GIT_COMMIT);
}

/// Goes in `<authoring_tool>`.
pub fn authoring_tool() -> String {
    format!("daexport {} ({})", env!("CARGO_PKG_VERSION"), GIT_COMMIT.trim())
}

#[test]
fn test_authoring_tool_names_version() {
    assert!(authoring_tool().starts_with("daexport 0."));
}
