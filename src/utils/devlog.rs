//! Trace records for cache internals (`tierlite::dev6`).
//!
//! The local tier, the window counters and the degrade controller describe what
//! they decided (rejections, purges, LRU evictions, degrade verdicts) as one-line
//! JSON through `dev6!`. Records always go to the `log` facade at trace level; a
//! test can additionally open a `Capture` on its own thread and read them back.

use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static CAPTURED: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Collects `dev6!` records emitted on the current thread until dropped.
///
/// Not `Send`: records made on other threads are never seen.
pub struct Capture {
    _thread_bound: PhantomData<*const ()>,
}

impl Capture {
    /// Starts collecting. Any earlier capture on this thread is restarted empty.
    #[must_use]
    pub fn start() -> Self {
        CAPTURED.with(|c| *c.borrow_mut() = Some(Vec::new()));
        Self { _thread_bound: PhantomData }
    }

    /// Returns the records collected so far and empties the buffer.
    pub fn take(&self) -> Vec<String> {
        CAPTURED.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
    }

    /// Returns a copy of the records collected so far.
    pub fn lines(&self) -> Vec<String> {
        CAPTURED.with(|c| c.borrow().clone().unwrap_or_default())
    }

    pub fn contains(&self, needle: &str) -> bool {
        CAPTURED.with(|c| c.borrow().as_ref().is_some_and(|buf| buf.iter().any(|l| l.contains(needle))))
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        CAPTURED.with(|c| *c.borrow_mut() = None);
    }
}

/// Appends `line` to this thread's capture, if one is open.
pub fn record(line: &str) {
    CAPTURED.with(|c| {
        if let Some(buf) = c.borrow_mut().as_mut() {
            buf.push(line.to_owned());
        }
    });
}

/// Emits a trace record on target `tierlite::dev6` and hands it to any open `Capture`.
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let line = format!($($arg)*);
        $crate::utils::devlog::record(&line);
        log::trace!(target: "tierlite::dev6", "{}", line);
    }};
}
