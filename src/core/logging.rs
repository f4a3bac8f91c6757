//! Logging initialization and utilities

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`, writing to stderr so
/// stdout stays free for protocol frames. Override with RUST_LOG.
///
/// # Example
/// ```
/// scenecomp::core::logging::init();
/// log::info!("Service started");
/// ```
pub fn init() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    )
    .target(env_logger::Target::Stderr)
    .try_init();
}
