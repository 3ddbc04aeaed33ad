//! HTTP API for managing records.
//!
//! The API performs no authentication: it must only be reachable from trusted networks, see
//! [`Config::api_bind_addr`][crate::config::Config::api_bind_addr].
//!
//! Errors are returned with a JSON body of the form `{"error": "..."}`. Invalid domains, record
//! types and values get HTTP 400 (Bad Request), missing records HTTP 404 (Not Found). Request
//! bodies that aren't JSON get HTTP 415, broken JSON HTTP 400 and JSON of the wrong shape HTTP 422.
//!
//! # API Endpoints
//!
//! ## `/healthcheck` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"ok":"healthy"}` when the service is operational.
//!
//! ## `/records` (POST)
//!
//!   Creates a record, replacing any record stored for the same domain and type. Expects a JSON
//!   request body of the form:
//!
//!   ```json
//!   { "domain": "host.example.com", "type": "A", "ttl": 300, "value": "192.0.2.10",
//!     "expires": 0, "ptr": true }
//!   ```
//!
//!   `type` is one of `A`, `AAAA`, `MX`, `CNAME` or `PTR` (in any case). `value` is an IP
//!   address for `A`/`AAAA` records and a domain name otherwise, `MX` records also take a
//!   `preference`. `ttl` defaults to 300 seconds. `expires` is a Unix timestamp after which the
//!   record is removed, omitted or `0` records never expire.
//!
//!   With `ptr` set, an `A`/`AAAA` record also gets its reverse pointer, a `PTR` record owned by
//!   the address's `in-addr.arpa.`/`ip6.arpa.` name and pointing at `domain`.
//!
//!   Returns HTTP 200 (OK) and the stored records:
//!
//!   ```json
//!   { "key": "com.example.host_1", "rr": "host.example.com. 300 IN A 192.0.2.10",
//!     "expires": 0,
//!     "ptr": { "key": "arpa.in-addr.192.0.2.10_12",
//!              "rr": "10.2.0.192.in-addr.arpa. 300 IN PTR host.example.com.", "expires": 0 } }
//!   ```
//!
//! ## `/records/:type/:domain` (DELETE)
//!
//!   Deletes the record stored for `domain` and `type`. Returns HTTP 200 (OK) and
//!   `{"key": "..."}`, or HTTP 404 (Not Found) if there was no such record.
//!
//!   Deleting an `A`/`AAAA` record also deletes the `PTR` record at the address's reverse name
//!   when it points at `domain`. Its key is then returned as `"ptr"`.
//!
//! ## `/dns-query` (POST)
//!
//!   Answers the DNS query message in the request body, returning the response message with
//!   content type `application/dns-message`. See [`Bridge`][crate::dns::Bridge].
//!
//!   ```bash
//!   ❯ curl -s --data-binary @query.bin -H 'content-type: application/dns-message' \
//!       http://localhost:3000/dns-query > response.bin
//!   ```

mod api_error;
mod model;
mod routes;
pub mod server;

pub use server::new;
