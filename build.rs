fn main() {
    // Rerun when git HEAD changes (commit, checkout, etc.)
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let describe = std::process::Command::new("git")
        .args(["describe", "--always", "--dirty", "--tags"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());

    let pkg = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let version = match describe {
        Some(rev) if !rev.is_empty() => format!("{} ({})", pkg, rev),
        _ => pkg,
    };

    println!("cargo:rustc-env=SPINE_BUILD_VERSION={}", version);
}
