//! Internal telemetry events.
//!
//! Pipeline code emits typed events rather than calling the metrics
//! macros directly, keeping metric names and labels in one place.

pub mod events;

/// An event significant enough to count or time.
pub trait InternalEvent {
    fn emit(self);
}

pub fn emit(event: impl InternalEvent) {
    event.emit();
}

#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::emit($event)
    };
}
