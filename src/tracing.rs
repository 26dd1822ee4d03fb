use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// sqlx logs every statement at info; a sync run issues several per item.
const QUIET_DIRECTIVES: &[&str] = &["sqlx=warn"];

fn build_filter(default_filter: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let mut directives = vec![default_filter.to_string()];
    directives.extend(QUIET_DIRECTIVES.iter().map(|d| d.to_string()));
    EnvFilter::new(directives.join(","))
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_filter`.
/// Fails if a subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    SubscriberBuilder::default()
        .with_env_filter(build_filter(default_filter))
        .with_target(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing subscriber already set: {e}"))
}
