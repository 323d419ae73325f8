//! Error record and classification.
//!
//! `ErrorInfo` is the dynamic, per-call error record described by the core:
//! a numeric code plus an optional message and program name. `ErrorKind`
//! gives the handful of error codes the runtime itself cares about a typed,
//! matchable surface; everything else passes through as `ErrorKind::Other`.

use std::fmt;
use std::sync::OnceLock;
use std::sync::Mutex;

use thiserror::Error;

/// Sentinel used when an errno-style call claimed failure without actually
/// setting `errno` (or the platform's equivalent via `last_os_error`).
pub const ERR_ERRNO_WAS_ZERO: i32 = -1;

/// Typed view over the numeric codes the runtime distinguishes. Any other
/// errno value round-trips through `Other` without losing information.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("resource temporarily unavailable")]
    Again,
    #[error("interrupted system call")]
    Interrupted,
    #[error("operation would block")]
    WouldBlock,
    #[error("communication error on send")]
    Comm,
    #[error("operation timed out")]
    Timeout,
    #[error("errno-style call failed without setting errno")]
    ErrnoWasZero,
    #[error("errno {0}")]
    Other(i32),
}

impl ErrorKind {
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            ERR_ERRNO_WAS_ZERO => ErrorKind::ErrnoWasZero,
            libc::EAGAIN => ErrorKind::Again,
            libc::EINTR => ErrorKind::Interrupted,
            #[allow(unreachable_patterns)] // EAGAIN == EWOULDBLOCK on most platforms
            libc::EWOULDBLOCK => ErrorKind::WouldBlock,
            libc::ETIMEDOUT => ErrorKind::Timeout,
            e if e == ecomm_code() => ErrorKind::Comm,
            e => ErrorKind::Other(e),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Again => libc::EAGAIN,
            ErrorKind::Interrupted => libc::EINTR,
            ErrorKind::WouldBlock => libc::EWOULDBLOCK,
            ErrorKind::Comm => ecomm_code(),
            ErrorKind::Timeout => libc::ETIMEDOUT,
            ErrorKind::ErrnoWasZero => ERR_ERRNO_WAS_ZERO,
            ErrorKind::Other(e) => e,
        }
    }
}

/// The host libc's spelling of `ECOMM`, falling back to `EBADRPC` the way
/// `util.h`'s `#ifndef ECOMM / #define ECOMM EBADRPC` does. Accepting either
/// spelling on input is handled by `error_temporary_p` below.
fn ecomm_code() -> i32 {
    #[cfg(target_os = "linux")]
    {
        libc::ECOMM
    }
    #[cfg(not(target_os = "linux"))]
    {
        libc::EBADRPC
    }
}

/// Whether `errnum` names a retryable condition: the caller should retry the
/// I/O rather than surface the error to the user.
pub fn error_temporary_p(errnum: i32) -> bool {
    errnum == libc::EAGAIN
        || errnum == libc::EINTR
        || errnum == libc::EWOULDBLOCK
        || errnum == ecomm_code()
        || errnum == libc::EBADRPC
}

/// Whether a catch frame should materialize a message string for a `die`
/// that it observes, or just the numeric code. A dedicated newtype instead
/// of a bare `bool` so call sites read as `WantMessage::Yes`, not `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WantMessage {
    Yes,
    No,
}

impl WantMessage {
    fn as_bool(self) -> bool {
        matches!(self, WantMessage::Yes)
    }
}

impl Default for WantMessage {
    fn default() -> Self {
        WantMessage::Yes
    }
}

impl From<bool> for WantMessage {
    fn from(b: bool) -> Self {
        if b {
            WantMessage::Yes
        } else {
            WantMessage::No
        }
    }
}

/// The error record carried across an unwind from `die`/`die_errno`/... to
/// the nearest `catch_error`.
#[derive(Debug, Clone, Default)]
pub struct ErrorInfo {
    pub err: i32,
    pub msg: Option<String>,
    pub prgname: Option<String>,
    pub(crate) want_msg: bool,
}

impl ErrorInfo {
    pub fn new(err: i32, msg: Option<String>, want_msg: WantMessage) -> Self {
        ErrorInfo {
            err,
            msg: if want_msg.as_bool() { msg } else { None },
            prgname: prgname(),
            want_msg: want_msg.as_bool(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_errno(self.err)
    }

    pub fn wanted_message(&self) -> bool {
        self.want_msg
    }

    pub fn is_temporary(&self) -> bool {
        error_temporary_p(self.err)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prg) = &self.prgname {
            write!(f, "{}: ", prg)?;
        }
        match &self.msg {
            Some(m) => write!(f, "{}", m),
            None => write!(f, "{}", self.kind()),
        }
    }
}

impl std::error::Error for ErrorInfo {}

/// `assert`-in-debug-builds, no-op-in-release macro matching `util.h`'s
/// `VERIFY`: the invariants it guards (at-most-once commit, commit of a
/// slot that was already detached) are programming errors, not conditions
/// a correct caller can trigger.
#[macro_export]
macro_rules! verify {
    ($cond:expr) => {
        debug_assert!($cond)
    };
}

static PRGNAME: OnceLock<Mutex<Option<String>>> = OnceLock::new();
static ORIG_ARGV0: OnceLock<Mutex<Option<String>>> = OnceLock::new();

fn prgname_cell() -> &'static Mutex<Option<String>> {
    PRGNAME.get_or_init(|| Mutex::new(None))
}

fn orig_argv0_cell() -> &'static Mutex<Option<String>> {
    ORIG_ARGV0.get_or_init(|| Mutex::new(None))
}

/// The process's current program name, read when composing error messages.
pub fn prgname() -> Option<String> {
    prgname_cell().lock().unwrap().clone()
}

/// Sets the process-wide program name. Called once during startup by the
/// embedding program; the core itself never calls this.
pub fn set_prgname(name: impl Into<String>) {
    *prgname_cell().lock().unwrap() = Some(name.into());
}

/// The original, unmodified `argv[0]`, distinct from `prgname` (which may
/// have been rewritten for display).
pub fn orig_argv0() -> Option<String> {
    orig_argv0_cell().lock().unwrap().clone()
}

pub fn set_orig_argv0(argv0: impl Into<String>) {
    *orig_argv0_cell().lock().unwrap() = Some(argv0.into());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_zero_coerces_to_sentinel() {
        assert_eq!(ErrorKind::from_errno(ERR_ERRNO_WAS_ZERO), ErrorKind::ErrnoWasZero);
    }

    #[test]
    fn temporary_errors_are_classified() {
        assert!(error_temporary_p(libc::EAGAIN));
        assert!(error_temporary_p(libc::EINTR));
        assert!(!error_temporary_p(libc::EIO));
    }

    #[test]
    fn ecomm_accepts_either_spelling() {
        assert!(error_temporary_p(libc::EBADRPC));
    }

    #[test]
    fn timeout_round_trips_through_from_errno_and_code() {
        assert_eq!(ErrorKind::from_errno(libc::ETIMEDOUT), ErrorKind::Timeout);
        assert_eq!(ErrorKind::Timeout.code(), libc::ETIMEDOUT);
    }

    #[test]
    fn want_msg_false_suppresses_message() {
        let ei = ErrorInfo::new(libc::EIO, Some("boom".to_string()), WantMessage::No);
        assert_eq!(ei.msg, None);
        assert_eq!(ei.err, libc::EIO);
    }

    #[test]
    fn prgname_round_trips() {
        set_prgname("reslist-test");
        assert_eq!(prgname().as_deref(), Some("reslist-test"));
    }
}
