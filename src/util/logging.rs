//! Logging setup for embedding applications and tests.

use tracing_subscriber::EnvFilter;

/// Environment variable overriding the default filter.
pub const LOG_ENV: &str = "PHLOEM_LOG";

/// Build the filter: `PHLOEM_LOG` if set, otherwise info (debug when verbose).
pub fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("phloem_manifest=debug")
        } else {
            EnvFilter::new("phloem_manifest=info")
        }
    })
}

/// Install a stderr subscriber.
///
/// Returns false if a global subscriber was already installed.
pub fn init(verbose: bool) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init(true);
        assert!(!init(false));
        tracing::debug!("logging initialized");
    }
}
