//! Signal-aware failure injection: widen the blocked-signal mask around a
//! blocking I/O window so a quit-class signal or an alarm converts to a
//! typed failure at the next cooperation point, instead of being silently
//! deferred or killing the process underneath the reslist machinery.
//!
//! Per the design notes (`spec.md` §9), signal delivery only ever *sets a
//! flag*; no Rust code (let alone `die`'s panic machinery) runs inside the
//! signal handler itself. The handler is `extern "C"` and touches nothing
//! but a couple of `AtomicBool`s, which is async-signal-safe. The actual
//! `die` call happens afterwards, at a cooperation point the caller
//! controls (the end of [`with_io_signals_allowed`], or explicitly via
//! [`check_cooperation_point`]).

use std::cell::Cell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;
use std::time::Duration;

use crate::unwind::die;

/// Process-wide: true once the process has started unwinding toward exit
/// because of a quit-class signal, so a second quit signal during that
/// unwind doesn't re-enter `die`.
pub static SIGNAL_QUIT_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

/// Process-wide: when set, a handler that would otherwise raise a failure
/// immediately instead just marks the signal pending, trusting the caller
/// to re-raise it later (e.g. after finishing a critical section).
pub static HACK_DEFER_QUIT_SIGNALS: AtomicBool = AtomicBool::new(false);

static PENDING_QUIT: AtomicBool = AtomicBool::new(false);
static PENDING_ALARM: AtomicBool = AtomicBool::new(false);

const IO_SIGNALS: &[libc::c_int] = &[libc::SIGINT, libc::SIGTERM, libc::SIGALRM];

static INSTALL_HANDLERS: Once = Once::new();

extern "C" fn io_signal_handler(signo: libc::c_int) {
    if signo == libc::SIGALRM {
        PENDING_ALARM.store(true, Ordering::SeqCst);
        return;
    }
    // Quit-class signal (SIGINT/SIGTERM).
    if SIGNAL_QUIT_IN_PROGRESS.swap(true, Ordering::SeqCst) {
        return; // already unwinding toward exit; nothing more to flag
    }
    PENDING_QUIT.store(true, Ordering::SeqCst);
    if HACK_DEFER_QUIT_SIGNALS.load(Ordering::SeqCst) {
        // Caller promised to re-raise later; un-mark in-progress so a
        // subsequent real quit attempt isn't swallowed.
        SIGNAL_QUIT_IN_PROGRESS.store(false, Ordering::SeqCst);
    }
}

fn install_handlers() {
    INSTALL_HANDLERS.call_once(|| {
        for &signo in IO_SIGNALS {
            // SAFETY: `io_signal_handler` only touches `AtomicBool`s, which
            // is async-signal-safe; `sa_mask`/`sa_flags` are zeroed, the
            // default for "no extra signals blocked, no SA_RESTART".
            unsafe {
                let mut sa: libc::sigaction = std::mem::zeroed();
                sa.sa_sigaction = io_signal_handler as usize;
                libc::sigemptyset(&mut sa.sa_mask);
                libc::sigaction(signo, &sa, std::ptr::null_mut());
            }
        }
    });
}

fn empty_sigset() -> libc::sigset_t {
    // SAFETY: `sigemptyset` only writes to `set`, a plain-old-data type.
    unsafe {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        libc::sigemptyset(set.as_mut_ptr());
        set.assume_init()
    }
}

fn io_signal_set() -> libc::sigset_t {
    let mut set = empty_sigset();
    // SAFETY: `set` is a valid, initialized `sigset_t`.
    unsafe {
        for &signo in IO_SIGNALS {
            libc::sigaddset(&mut set, signo);
        }
    }
    set
}

/// Raises `die` for whichever signal fired while IO-signals were allowed,
/// clearing the corresponding pending flag. A no-op if nothing is pending.
/// This is the cooperation point the design notes require: ordinary
/// control flow, not the signal handler, performs the unwind.
pub fn check_cooperation_point() {
    if PENDING_ALARM.swap(false, Ordering::SeqCst) {
        die(libc::ETIMEDOUT, "operation timed out");
    }
    if PENDING_QUIT.swap(false, Ordering::SeqCst) {
        die(libc::EINTR, "interrupted by signal");
    }
}

thread_local! {
    static SAVED_MASK: Cell<Option<libc::sigset_t>> = const { Cell::new(None) };
}

/// `WITH_IO_SIGNALS_ALLOWED`: unblocks the signals this module treats as
/// I/O-cancelling (`SIGINT`, `SIGTERM`, `SIGALRM`) for the duration of `f`,
/// restoring the prior mask on every exit path (including unwind, handled
/// by `IoSignalsGuard`'s `Drop`). After `f` returns, checks the cooperation
/// point so a signal that fired during `f` converts to a `die` here rather
/// than being silently swallowed.
pub fn with_io_signals_allowed<F: FnOnce() -> R, R>(f: F) -> R {
    install_handlers();
    let _guard = IoSignalsGuard::enter();
    let result = f();
    check_cooperation_point();
    result
}

struct IoSignalsGuard;

impl IoSignalsGuard {
    fn enter() -> Self {
        let unblock = io_signal_set();
        let mut saved = empty_sigset();
        // SAFETY: `saved` and `unblock` are valid, initialized sigsets; this
        // is the standard "unblock, remembering the old mask" sequence.
        unsafe {
            libc::sigprocmask(libc::SIG_UNBLOCK, &unblock, &mut saved);
        }
        SAVED_MASK.with(|cell| cell.set(Some(saved)));
        IoSignalsGuard
    }
}

impl Drop for IoSignalsGuard {
    fn drop(&mut self) {
        if let Some(saved) = SAVED_MASK.with(|cell| cell.take()) {
            // SAFETY: `saved` was populated by a prior, successful
            // `sigprocmask` call in `enter`.
            unsafe {
                libc::sigprocmask(libc::SIG_SETMASK, &saved, std::ptr::null_mut());
            }
        }
    }
}

/// `set_timeout`: arms a `SIGALRM`-driven timeout of `duration`. While
/// inside `with_io_signals_allowed`, expiry converts to a `die` at the next
/// cooperation point. The timer and pending-alarm flag are cleared on
/// every exit path via `TimeoutGuard`'s `Drop`.
pub fn set_timeout(duration: Duration) -> TimeoutGuard {
    install_handlers();
    let timer = libc::itimerval {
        it_interval: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        it_value: libc::timeval {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_usec: duration.subsec_micros() as libc::suseconds_t,
        },
    };
    let mut previous = MaybeUninit::<libc::itimerval>::uninit();
    // SAFETY: `timer` and `previous` are valid, correctly-sized itimerval
    // buffers.
    unsafe {
        libc::setitimer(libc::ITIMER_REAL, &timer, previous.as_mut_ptr());
    }
    TimeoutGuard {
        previous: unsafe { previous.assume_init() },
    }
}

pub struct TimeoutGuard {
    previous: libc::itimerval,
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        PENDING_ALARM.store(false, Ordering::SeqCst);
        // SAFETY: `self.previous` was captured by a prior `setitimer` call
        // in `set_timeout`.
        unsafe {
            libc::setitimer(libc::ITIMER_REAL, &self.previous, std::ptr::null_mut());
        }
    }
}
