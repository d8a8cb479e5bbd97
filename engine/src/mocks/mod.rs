//! Test doubles for engine collaborators.
//!
//! Compiled into the library so integration tests and downstream crates can
//! drive the engine without network access.

mod notifier;

pub use notifier::RecordingNotifier;
