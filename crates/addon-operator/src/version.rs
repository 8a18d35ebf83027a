/// Operator version, stamped on the objects created by the bootstrap step.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// One-line build description: version, build date and compiler.
pub fn build_info() -> String {
    format!(
        "{} {} (rustc {})",
        version(),
        option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"),
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown"),
    )
}
