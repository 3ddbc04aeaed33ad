//! Storage key derivation.
//!
//! Every record lives under a key built from its owner name and record type. The labels of the
//! owner name are reversed so that keys sort by top-level domain first, keeping all records of a
//! zone next to each other in the store:
//!
//! ```
//! use ddns::keys::derive_key;
//! use trust_dns_proto::rr::RecordType;
//!
//! assert_eq!(derive_key("www.example.com", RecordType::A).unwrap(), "com.example.www_1");
//! assert_eq!(derive_key("Example.COM.", RecordType::AAAA).unwrap(), "com.example_28");
//! ```

use crate::error::Error;
use trust_dns_proto::rr::RecordType;

/// Separates the reversed domain from the record type code.
pub const TYPE_DELIMITER: char = '_';

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_WIRE_LEN: usize = 255;

/// Derive the storage key for `domain` and `record_type`.
///
/// # Errors
///
/// Returns [`Error::InvalidDomain`] if `domain` is not a well-formed DNS name.
pub fn derive_key(domain: &str, record_type: RecordType) -> Result<String, Error> {
    let labels = split_domain(domain)?;
    let reversed = if labels.is_empty() {
        ".".to_string()
    } else {
        labels
            .iter()
            .rev()
            .map(|l| l.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(".")
    };
    Ok(format!(
        "{reversed}{TYPE_DELIMITER}{}",
        u16::from(record_type)
    ))
}

/// Check that `domain` is a well-formed DNS name, in relative or fully qualified form.
#[must_use]
pub fn is_domain_name(domain: &str) -> bool {
    split_domain(domain).is_ok()
}

fn split_domain(domain: &str) -> Result<Vec<&str>, Error> {
    let invalid = || Error::InvalidDomain(domain.to_string());

    if domain.is_empty() {
        return Err(invalid());
    }
    if domain == "." {
        return Ok(Vec::new());
    }

    let trimmed = domain.strip_suffix('.').unwrap_or(domain);
    let labels: Vec<&str> = trimmed.split('.').collect();

    // One length octet per label plus the terminating root label.
    let wire_len = labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1;
    if wire_len > MAX_NAME_WIRE_LEN {
        return Err(invalid());
    }

    let label_ok = |l: &&str| {
        !l.is_empty()
            && l.len() <= MAX_LABEL_LEN
            && l.bytes().all(|b| b.is_ascii_graphic() && b != b'\\')
    };
    if labels.iter().all(label_ok) {
        Ok(labels)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverses_labels_and_appends_type_code() {
        assert_eq!(
            derive_key("example.com", RecordType::A).unwrap(),
            "com.example_1"
        );
        assert_eq!(
            derive_key("mail.example.com.", RecordType::MX).unwrap(),
            "com.example.mail_15"
        );
        assert_eq!(
            derive_key("1.0.0.10.in-addr.arpa.", RecordType::PTR).unwrap(),
            "arpa.in-addr.10.0.0.1_12"
        );
    }

    #[test]
    fn deterministic_and_case_insensitive() {
        let first = derive_key("Host.Example.com", RecordType::AAAA).unwrap();
        let second = derive_key("host.example.com.", RecordType::AAAA).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, derive_key("Host.Example.com", RecordType::AAAA).unwrap());
    }

    #[test]
    fn distinct_types_give_distinct_keys() {
        assert_ne!(
            derive_key("example.com", RecordType::A).unwrap(),
            derive_key("example.com", RecordType::AAAA).unwrap()
        );
    }

    #[test]
    fn root_name() {
        assert_eq!(derive_key(".", RecordType::A).unwrap(), "._1");
    }

    #[test]
    fn rejects_malformed_names() {
        let too_long_label = format!("{}.com", "a".repeat(64));
        let too_long_name = vec!["abcdefghi"; 30].join(".");
        for bad in [
            "",
            "..",
            "a..b",
            ".example.com",
            "exa mple.com",
            "example.com..",
            too_long_label.as_str(),
            too_long_name.as_str(),
        ] {
            assert!(
                matches!(derive_key(bad, RecordType::A), Err(Error::InvalidDomain(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn accepts_service_labels() {
        assert!(is_domain_name("_acme-challenge.example.com"));
        assert!(is_domain_name(&format!("{}.com", "a".repeat(63))));
    }
}
