//! Chain-structured assignment model.
//!
//! Each server anchors one chain of tasks linked by predecessor keys with
//! successor back-references. Derived values are kept fresh by forward
//! propagation, and every edit is reported to a [`ChangeObserver`].

mod observer;
mod propagation;
mod schedule;

pub use observer::{ChangeObserver, NoopObserver, Notification, RecordingObserver, Variable};
pub use propagation::{derive_from, propagate_all, propagate_from};
pub use schedule::{Chain, ChainError, InvariantViolation, Schedule};
