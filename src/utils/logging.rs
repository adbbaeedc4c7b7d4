//! Logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! A module opts in by declaring the flag and importing the macros it needs:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("feed ready with {} reports", 3);
//! ```
//! Flipping the flag to `false` silences one noisy module without touching the
//! global `RUST_LOG` filter.

/// `log::debug!` when the calling module has `ENABLE_LOGS` set.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// `log::info!` when the calling module has `ENABLE_LOGS` set.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// `log::warn!` when the calling module has `ENABLE_LOGS` set.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// `log::error!` when the calling module has `ENABLE_LOGS` set.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
