//! Authoritative DNS server with dynamic updates.
//!
//! # Queries
//!
//! ddns answers `QUERY` messages from the [record store][crate::record_store]. Each question is
//! answered independently with the record stored for its exact name and type, no wildcards are
//! expanded and no CNAMEs are chased. Questions without a record are skipped, and a response
//! without any answer is `NXDOMAIN`. Every response is authoritative.
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +short host.example.com A
//! 10.0.0.1
//! ```
//!
//! # Dynamic Updates
//!
//! `UPDATE` messages ([RFC-2136][RFC-2136]) add and delete records. Each update instruction is
//! applied in order:
//!
//! * class `ANY` with empty data deletes the record stored for the name and type,
//! * anything else adds (or replaces) an `A` or `AAAA` record. Other types are skipped, use the
//!   [HTTP API][crate::api] to manage them.
//!
//! ```bash
//! ❯ nsupdate -y hmac-sha256:update-key:c2VjcmV0 <<EOF
//! server 127.0.0.1 5353
//! zone example.com
//! update add host.example.com 300 A 10.0.0.1
//! send
//! EOF
//! ```
//!
//! By default updates must be signed with the [`Config::tsig`][crate::config::Config::tsig]
//! key ([RFC-8945][RFC-8945]), unsigned updates are refused. Set
//! [`Config::require_authenticated_updates`][crate::config::Config::require_authenticated_updates]
//! to `false` to accept them. A signature that doesn't verify is logged and reported in the
//! TSIG record of the answer. Queries are still answered, updates are never applied and get a
//! `NOTAUTH` response.
//!
//! [RFC-2136]: https://www.rfc-editor.org/rfc/rfc2136
//! [RFC-8945]: https://www.rfc-editor.org/rfc/rfc8945

pub mod bridge;
pub mod handlers;
pub mod server;
pub mod tsig;

pub use bridge::Bridge;
pub use handlers::Handler;
pub use server::{new, Server};
