//! Process-wide tracing setup.

use tracing_subscriber::EnvFilter;

/// Installs a stderr `fmt` subscriber filtered at `level`, unless `RUST_LOG`
/// is set. Calling it again is a no-op.
pub fn init(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_twice_is_harmless() {
        super::init("debug");
        super::init("warn");
        tracing::debug!("logging initialized");
    }
}
