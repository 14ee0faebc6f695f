//! Elasticsearch HTTP access: document counts, the scroll scan feeding the
//! pipeline and the bulk executor draining it.

pub mod bulk;
pub mod client;
pub mod query;

pub use bulk::BulkClient;
pub use client::SearchClient;
