//! Logging setup for hosts embedding the layer
//!
//! The layer itself only emits `tracing` events; hosts that have no
//! subscriber of their own can install one with [`init_logging`].

use tracing_subscriber::EnvFilter;

/// Builds the filter for a verbosity level
///
/// `RUST_LOG`, when set, takes precedence over the verbosity flags.
pub fn build_filter(verbose: u8, quiet: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_warden=info,warn"),
            1 => EnvFilter::new("crawl_warden=debug,info"),
            2 => EnvFilter::new("crawl_warden=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    }
}

/// Installs a global fmt subscriber
///
/// Does nothing if the host already installed a subscriber.
pub fn init_logging(verbose: u8, quiet: bool) {
    let result = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose, quiet))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .try_init();

    if result.is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
}
