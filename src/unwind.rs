//! Non-local failure: `die` and `catch_error`.
//!
//! `die` never returns; control resumes at the nearest enclosing
//! `catch_error`, after every reslist entered since that frame has been
//! torn down (cleanups run in the process). The target-language mapping
//! chosen here is `std::panic::panic_any` / `catch_unwind`: a `die` is a
//! stack-unwinding panic carrying a typed payload (`DieUnwind`), and
//! `catch_error` is the boundary catcher — matching the design notes'
//! "stack-unwinding panics with a boundary catcher" strategy, which the
//! notes reserve for exactly this kind of cross-component non-local exit.
//! A panic whose payload is *not* `DieUnwind` is a genuine Rust panic (a
//! programming bug, not a `die`); `catch_error` resumes it rather than
//! swallowing it.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use crate::current::ScopedReslist;
use crate::error::{ErrorInfo, WantMessage, ERR_ERRNO_WAS_ZERO};
use crate::resource::Reslist;

struct DieUnwind(ErrorInfo);

thread_local! {
    /// Whether the nearest enclosing `catch_error` asked for a materialized
    /// message. `die` consults this so `die_oom` (and any `die` under a
    /// catch that passed `errinfo: None`) can skip formatting entirely.
    static WANT_MSG: RefCell<Vec<bool>> = const { RefCell::new(Vec::new()) };
}

/// Whether the nearest enclosing `catch_error` asked for a materialized
/// message. Public so the `die!` macro (usable from outside this module,
/// and outside this crate via `#[macro_export]`) can gate `format!` on it
/// without paying for formatting on a path that will discard the result.
pub fn want_message() -> bool {
    WANT_MSG.with(|stack| stack.borrow().last().copied().unwrap_or(true))
}

fn push_want_message(want: bool) {
    WANT_MSG.with(|stack| stack.borrow_mut().push(want));
}

fn pop_want_message() {
    WANT_MSG.with(|stack| {
        stack.borrow_mut().pop();
    });
}

static INSTALL_HOOK: Once = Once::new();

/// Suppresses the default panic hook's noisy backtrace for `DieUnwind`
/// payloads (an ordinary, expected control-flow event here), while leaving
/// genuine panics to print exactly as they would without this crate.
fn ensure_quiet_hook() {
    INSTALL_HOOK.call_once(|| {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<DieUnwind>().is_some() {
                return;
            }
            default_hook(info);
        }));
    });
}

/// `die(err, fmt, ...)`: unwinds with a logical failure.
pub fn die(err: i32, msg: impl Into<String>) -> ! {
    ensure_quiet_hook();
    let ei = ErrorInfo::new(err, Some(msg.into()), WantMessage::from(want_message()));
    panic::panic_any(DieUnwind(ei))
}

/// Ergonomic `die!(err, fmt, args...)`, formatting only when a message is
/// actually wanted: the nearest enclosing `catch_error` determines this
/// (it passed `errinfo: None`), so a `die!` under such a frame skips
/// `format!` entirely rather than materializing a message nobody will read.
#[macro_export]
macro_rules! die {
    ($err:expr, $($arg:tt)*) => {
        if $crate::unwind::want_message() {
            $crate::unwind::die($err, format!($($arg)*))
        } else {
            $crate::unwind::die($err, String::new())
        }
    };
}

/// `die_errno(fmt, ...)`: reads the platform's last OS error at the moment
/// of the call, substituting `ERR_ERRNO_WAS_ZERO` if it reads as zero, and
/// dies with that code.
pub fn die_errno(msg: impl Into<String>) -> ! {
    let errno = std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(ERR_ERRNO_WAS_ZERO);
    let errno = if errno == 0 { ERR_ERRNO_WAS_ZERO } else { errno };
    die(errno, msg)
}

/// `die_oom()`: out-of-memory. Must not itself allocate, so it skips the
/// usual `ErrorInfo::new` path (which would clone `prgname`) entirely and
/// builds the record as a bare struct literal with no message.
pub fn die_oom() -> ! {
    ensure_quiet_hook();
    let ei = ErrorInfo {
        err: libc::ENOMEM,
        msg: None,
        prgname: None,
        want_msg: false,
    };
    panic::panic_any(DieUnwind(ei))
}

/// `die_rethrow(ei)`: re-propagates an already-captured error record
/// verbatim, to the next outer catch frame.
pub fn die_rethrow(ei: ErrorInfo) -> ! {
    ensure_quiet_hook();
    panic::panic_any(DieUnwind(ei))
}

/// `catch_error(fn, data, errinfo)`: runs `f` with a fresh private reslist
/// as current.
///
/// * If `f` returns normally, the private reslist's contents are
///   transferred to the reslist that was current before the catch (so they
///   outlive this call), and the now-empty private reslist is destroyed.
///   Returns `false`.
/// * If `f` unwinds via `die`, the private reslist is destroyed immediately
///   (its cleanups run, LIFO). The error record is copied into `errinfo` if
///   provided. Returns `true`.
///
/// A non-`die` panic (a genuine bug) is not caught here: it resumes
/// unwinding past this frame after the private reslist has still been torn
/// down (by `ScopedReslist`'s `Drop`), so cleanups still run correctly on
/// the way out.
pub fn catch_error<F>(f: F, errinfo: Option<&mut ErrorInfo>) -> bool
where
    F: FnOnce() + std::panic::UnwindSafe,
{
    let outer = crate::current::current();
    let mut scope = ScopedReslist::new();
    push_want_message(errinfo.is_some());

    let result = panic::catch_unwind(AssertUnwindSafe(f));
    pop_want_message();

    match result {
        Ok(()) => {
            let private = scope.reslist();
            Reslist::xfer(&outer, &private);
            scope.finish(); // private is now empty; this just restores `current`
            false
        }
        Err(payload) => {
            scope.finish(); // destroys private, running its cleanups LIFO
            match payload.downcast::<DieUnwind>() {
                Ok(die) => {
                    if let Some(slot) = errinfo {
                        *slot = die.0;
                    }
                    true
                }
                Err(payload) => panic::resume_unwind(payload),
            }
        }
    }
}

/// `catch_one_error(fn, data, errnum)`: like `catch_error`, but only a
/// matching error code is reported as handled; anything else is
/// rethrown via `die_rethrow`.
pub fn catch_one_error<F>(f: F, errnum: i32) -> bool
where
    F: FnOnce() + std::panic::UnwindSafe,
{
    let mut ei = ErrorInfo::default();
    if !catch_error(f, Some(&mut ei)) {
        return false;
    }
    if ei.err == errnum {
        true
    } else {
        die_rethrow(ei)
    }
}

/// Runs `f` under a top-level catch frame; on error, prints the message
/// (prefixed by `prgname`, matching `ErrorInfo`'s `Display`) to stderr and
/// exits with a nonzero status. This is the process-level default catch
/// `spec.md` §7 describes for when no other catch is installed.
pub fn run_with_default_catch<F>(f: F) -> !
where
    F: FnOnce() + std::panic::UnwindSafe,
{
    let mut ei = ErrorInfo::default();
    if catch_error(f, Some(&mut ei)) {
        eprintln!("{}", ei);
        std::process::exit(1);
    }
    std::process::exit(0);
}
