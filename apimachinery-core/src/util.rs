//! Panic recovery at serializer and admission boundaries.
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicBool, Ordering},
};

static REALLY_CRASH: AtomicBool = AtomicBool::new(false);

/// Make [`handle_crash`] re-raise recovered panics after logging them.
pub fn set_really_crash(really: bool) {
    REALLY_CRASH.store(really, Ordering::Relaxed);
}

/// Whether recovered panics are re-raised
pub fn really_crash() -> bool {
    REALLY_CRASH.load(Ordering::Relaxed)
}

/// Render a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-textual panic payload".to_string()
    }
}

/// Log a panic caught at `boundary`, re-raising it when configured to.
///
/// Returns the rendered message otherwise.
pub fn report_panic(boundary: &str, payload: Box<dyn Any + Send>) -> String {
    let message = panic_message(payload.as_ref());
    tracing::error!(boundary, %message, "recovered from panic");
    if really_crash() {
        panic::resume_unwind(payload);
    }
    message
}

/// Run `f`, turning a panic into `Err` with the panic message.
///
/// # Panics
///
/// Re-raises the original panic when [`set_really_crash`] was called with `true`.
pub fn handle_crash<T>(boundary: &str, f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| report_panic(boundary, payload))
}
