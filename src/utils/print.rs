//! Logging setup and leveled print macros, prefixed with this node's
//! identity so that interleaved multi-node test output stays readable.

use std::sync::OnceLock;

/// This node's identity string, set once at driver construction and read
/// by every `pf_*!` call site. Empty until `set_me()` is called.
pub static ME: OnceLock<String> = OnceLock::new();

/// Sets the node identity used as a log prefix. Safe to call multiple
/// times from tests running separate nodes in the same process; only the
/// first call per process actually takes effect, matching `OnceLock`
/// semantics -- callers that need a fresh prefix per task should format
/// identity into the message itself instead of relying on `ME`.
pub fn set_me(id: impl Into<String>) {
    let _ = ME.set(id.into());
}

#[inline]
pub(crate) fn me() -> &'static str {
    ME.get().map(String::as_str).unwrap_or("?")
}

/// Initializes the `env_logger` backend. Embedders call this once at
/// process startup; calling it more than once is a harmless no-op.
pub fn logger_init() {
    let _ = env_logger::try_init();
}

/// `log::error!`, prefixed with node identity.
#[macro_export]
macro_rules! pf_error {
    ($($arg:tt)*) => {
        log::error!("{:<10} {}", $crate::utils::print::me(), format_args!($($arg)*))
    };
}

/// `log::warn!`, prefixed with node identity.
#[macro_export]
macro_rules! pf_warn {
    ($($arg:tt)*) => {
        log::warn!("{:<10} {}", $crate::utils::print::me(), format_args!($($arg)*))
    };
}

/// `log::info!`, prefixed with node identity.
#[macro_export]
macro_rules! pf_info {
    ($($arg:tt)*) => {
        log::info!("{:<10} {}", $crate::utils::print::me(), format_args!($($arg)*))
    };
}

/// `log::debug!`, prefixed with node identity.
#[macro_export]
macro_rules! pf_debug {
    ($($arg:tt)*) => {
        log::debug!("{:<10} {}", $crate::utils::print::me(), format_args!($($arg)*))
    };
}

/// `log::trace!`, prefixed with node identity.
#[macro_export]
macro_rules! pf_trace {
    ($($arg:tt)*) => {
        log::trace!("{:<10} {}", $crate::utils::print::me(), format_args!($($arg)*))
    };
}

/// Logs a message at error level and returns it wrapped in
/// `Err(ElectionError::Internal(..))` in one call, saving the usual
/// `let e = ...; pf_error!(...); return Err(e)` dance.
#[macro_export]
macro_rules! logged_err {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::pf_error!("{}", msg);
        Err($crate::utils::ElectionError::Internal(msg))
    }};
}
