//! Tracing subscriber setup for binaries embedding the library.

use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

const CRATE_DIRECTIVE: &str = "launchkit_core=debug";

/// Builds the default filter: `RUST_LOG`, plus debug output for this crate
/// and INFO for everything else.
pub fn default_filter() -> EnvFilter {
    let filter = EnvFilter::from_default_env();
    let filter = match CRATE_DIRECTIVE.parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    filter.add_directive(tracing::Level::INFO.into())
}

/// Installs a fmt subscriber with [`default_filter`].
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place and return false.
pub fn init() -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting launchkit v{}", crate::VERSION);
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _ = init();
        assert!(!init());
    }

    #[test]
    fn test_crate_directive_parses() {
        assert!(CRATE_DIRECTIVE.parse::<Directive>().is_ok());
        assert!(default_filter().to_string().contains("launchkit_core=debug"));
    }
}
