// Build provenance shown by `xorigin version --extended`.
fn main() {
    for (var, exported) in [
        ("TARGET", "XORIGIN_BUILD_TARGET"),
        ("PROFILE", "XORIGIN_BUILD_PROFILE"),
    ] {
        println!("cargo:rerun-if-env-changed={var}");
        let value = std::env::var(var).unwrap_or_else(|_| "unknown".to_string());
        println!("cargo:rustc-env={exported}={value}");
    }
}
