//! ddns
//!
//! An authoritative DNS server for records managed at runtime. Records are added and removed
//! with [RFC-2136][RFC-2136] dynamic updates signed with [TSIG][RFC-8945], or through a small
//! [HTTP API][crate::api], and persisted in a single-file [redb] database. Records may carry an
//! expiry, after which they're removed by the [reaper][crate::reaper].
//!
//! Only `A`, `AAAA`, `MX`, `CNAME` and `PTR` records are served.
//!
//! [RFC-2136]: https://www.rfc-editor.org/rfc/rfc2136
//! [RFC-8945]: https://www.rfc-editor.org/rfc/rfc8945
//! [redb]: https://www.redb.org
//!
#![warn(clippy::pedantic)]

pub mod api;
pub mod config;
pub mod dns;
pub mod error;
pub mod keys;
pub mod reaper;
pub mod record;
pub mod record_store;

pub use api::new as new_http;
pub use config::{Config, SharedConfig};
pub use dns::new as new_dns;
pub use reaper::Reaper;
pub use record_store::{DynRecordStore, InMemoryRecordStore, RedbRecordStore};
