//! `tracing` subscriber setup for host applications.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding an `EnvFilter` directive, e.g.
/// `CHORALE_LOG=chorale_sync=debug,info`.
pub const LOG_ENV: &str = "CHORALE_LOG";

/// Install a formatting subscriber filtered by [`LOG_ENV`], or by
/// `default_filter` when the variable is unset or unparseable.
///
/// Returns `false` if a global subscriber was already installed, in which case
/// nothing changes.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        // Whether the first call wins depends on test ordering; the second
        // never does.
        let _ = init("info");
        assert!(!init("debug"));
    }
}
