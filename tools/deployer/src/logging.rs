use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install the global subscriber. Logs go to stderr; stdout carries the run summary.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()?;
    }
    Ok(())
}
