use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects debug over info.
/// `LOG_FORMAT=json` switches to one JSON object per event.
pub fn init_logging(verbose: bool) {
    let filter = std::env::var("RUST_LOG").map_or_else(
        |_| EnvFilter::new(default_level(verbose)),
        |value| {
            EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new(default_level(verbose)))
        },
    );

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };

    if let Err(err) = result {
        eprintln!("Failed to set global default subscriber: {}", err);
    }
}

fn default_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}
