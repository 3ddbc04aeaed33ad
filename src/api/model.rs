use serde::{Deserialize, Serialize};

const DEFAULT_TTL: u32 = 300;

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

#[derive(Deserialize, Debug, Clone, Eq, PartialEq)]
pub(super) struct CreateRecordRequest {
    pub domain: String,
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    pub value: String,
    /// MX only.
    #[serde(default)]
    pub preference: u16,
    /// Unix timestamp after which the record is removed. Omitted or zero never expires.
    #[serde(default)]
    pub expires: i64,
    /// Also store the reverse pointer of an A or AAAA record.
    #[serde(default)]
    pub ptr: bool,
}

#[derive(Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub(super) struct StoredRecordResult {
    pub key: String,
    pub rr: String,
    pub expires: i64,
}

#[derive(Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub(super) struct CreateRecordResult {
    #[serde(flatten)]
    pub record: StoredRecordResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<StoredRecordResult>,
}

#[derive(Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub(super) struct DeleteRecordResult {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<String>,
}
