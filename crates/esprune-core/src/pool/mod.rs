//! Fixed-size pool of chunk executors.
//!
//! ## Structure
//!
//! - [`manager`] - [`WorkerPool`], submission and shutdown.
//! - [`worker`] - the worker event loop over the shared queue.
//! - [`request`] - messages exchanged with workers.

pub mod manager;
pub mod request;
pub mod worker;

pub use manager::WorkerPool;
pub use request::{TaskOutput, WorkRequest};
pub use worker::SharedQueue;
