use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `debug`.
pub fn init(debug: bool) {
    let default = if debug {
        "ticket_migrate=debug"
    } else {
        "ticket_migrate=info"
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
