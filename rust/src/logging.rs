//! Logging macros with verbosity level control.
//!
//! Events go through `tracing`; the verbosity level decides which of them are
//! emitted at all, so a silent solver skips formatting entirely.
//! - 0: SILENT (only rejected changes, logged at warn)
//! - 1: CHANGES (applied changes, new best solutions)
//! - 2: CHECKS (move evaluation, stale references)
//! - 3: DEBUG (queue draining and propagation internals)

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at CHANGES level (verbosity >= 1) as `tracing::info!`.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            ::tracing::info!($($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2) as `tracing::debug!`.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            ::tracing::debug!($($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3) as `tracing::trace!`.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            ::tracing::trace!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels_ordered() {
        assert!(VERBOSITY_SILENT < VERBOSITY_CHANGES);
        assert!(VERBOSITY_CHANGES < VERBOSITY_CHECKS);
        assert!(VERBOSITY_CHECKS < VERBOSITY_DEBUG);
    }

    #[test]
    fn test_log_macros_compile() {
        let verbosity = VERBOSITY_DEBUG;
        log_changes!(verbosity, "applied {}", 1);
        log_checks!(verbosity, task = "c1", "checked");
        log_debug!(verbosity, "drained {} changes", 3);
    }
}
