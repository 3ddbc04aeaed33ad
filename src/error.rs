//! Error types.

use axum::extract::rejection::JsonRejection;
use std::net::IpAddr;
use trust_dns_proto::error::ProtoError;

use crate::dns::tsig::TsigRcode;

/// Error enumerates the possible ddns error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned by the [key codec][crate::keys::derive_key] (and everything built on it) when a
    /// domain name is not a syntactically valid DNS name. Invalid names never reach the store.
    #[error("invalid domain: \"{0}\"")]
    InvalidDomain(String),

    /// Returned when a record type outside of A, AAAA, MX, CNAME and PTR is requested.
    #[error("record type not supported: {0} (use one of A, AAAA, MX, CNAME, PTR)")]
    UnsupportedType(String),

    /// Returned when a record value can't be parsed for its record type, e.g. a `AAAA` record
    /// whose value isn't an IPv6 literal.
    #[error("invalid {rtype} value: \"{value}\"")]
    InvalidValue { rtype: String, value: String },

    /// Returned when the [record store][crate::record_store::RecordStore] has no record for a
    /// key.
    #[error("record not found, key: \"{0}\"")]
    NotFound(String),

    /// Returned when a stored value can't be decoded back into a record.
    #[error("corrupt record stored at \"{key}\": {reason}")]
    CorruptRecord { key: String, reason: String },

    /// Returned when the backing database fails to open, read or write.
    #[error("storage error")]
    Storage(#[from] redb::Error),

    /// Returned when a store operation is attempted after
    /// [`RedbRecordStore::disconnect`][crate::record_store::RedbRecordStore::disconnect].
    #[error("record store is closed")]
    StoreClosed,

    /// Returned when the backing database stays locked by another process for longer than the
    /// configured open timeout.
    #[error("timed out opening record store \"{0}\"")]
    StoreTimeout(String),

    /// Returned when a DNS wire message can't be decoded.
    #[error("failed to decode DNS message")]
    Decode(#[source] ProtoError),

    /// Returned when a DNS wire message can't be encoded.
    #[error("failed to encode DNS message")]
    Encode(#[source] ProtoError),

    /// Returned when a TSIG signature doesn't verify against the configured key.
    #[error("TSIG verification failed: {0}")]
    Auth(TsigRcode),

    /// Returned when the configured TSIG secret isn't valid base64.
    #[error("TSIG secret is not valid base64")]
    InvalidSecret(#[from] base64::DecodeError),

    /// Returned when clients `POST` invalid JSON to the [HTTP API][crate::api].
    #[error(transparent)]
    JsonExtractorRejection(#[from] JsonRejection),

    /// Returned when the [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`] is
    /// not a loopback address, or an address within a private network space. The
    /// [HTTP API][crate::api] performs no authentication of its own and must only be reachable
    /// from trusted networks.
    #[error("API bind address ({0}) must be a loopback or private IP")]
    InsecureAPIBind(IpAddr),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when processing JSON fails, e.g. when
    /// [trying to load a `Config`][crate::config::Config::try_from_file] or decoding a stored
    /// record.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),
}

impl Error {
    /// True for the errors that only mean "nothing stored under that key".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

macro_rules! storage_error_from {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for Error {
                fn from(err: $err) -> Self {
                    Error::Storage(err.into())
                }
            }
        )*
    };
}

storage_error_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
