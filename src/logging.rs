//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Install a compact stderr subscriber. `RUST_LOG` wins when set.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .compact()
        .without_time()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "warn,swagger_clap=debug"
    } else {
        "warn"
    }
}
