//! Run orchestration.
//!
//! ## Structure
//!
//! - [`handler`] - the retention run entry point (`RetentionJob`).

pub mod handler;
