#![forbid(unsafe_code)]

//! Single-threaded reactive primitives.
//!
//! - [`Observable`]: shared value with change notification.
//! - [`BatchScope`]: defers and coalesces notifications.

pub mod batch;
pub mod observable;

pub use batch::BatchScope;
pub use observable::{Observable, Subscription};
