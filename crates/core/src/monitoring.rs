use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "imfdb_scraper=debug,imfdb_scraper_core=debug"
    } else {
        "info"
    }
}

/// Initialize the tracing subscriber. Logs go to stderr so stdout stays
/// usable for JSON output; `RUST_LOG` overrides the default filter.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    // A second init (e.g. in tests) is not an error
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Errors only, for runs that print JSON to stdout.
pub fn init_tracing_quiet() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("error"))
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init();
}
