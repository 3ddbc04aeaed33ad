//! Resource records served by ddns.
//!
//! Only a closed set of record types is supported: A, AAAA, MX, CNAME and PTR. Records are
//! persisted in their zone-file presentation form, e.g.
//!
//! ```text
//! host.example.com. 300 IN A 10.0.0.1
//! example.com. 3600 IN MX 10 mail.example.com.
//! ```

use crate::error::Error;
use crate::keys;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use trust_dns_proto::rr::rdata::MX;
use trust_dns_proto::rr::{DNSClass, Name, RData, Record, RecordType};

/// The supported record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    A,
    Aaaa,
    Mx,
    Cname,
    Ptr,
}

impl Kind {
    #[must_use]
    pub fn record_type(self) -> RecordType {
        match self {
            Kind::A => RecordType::A,
            Kind::Aaaa => RecordType::AAAA,
            Kind::Mx => RecordType::MX,
            Kind::Cname => RecordType::CNAME,
            Kind::Ptr => RecordType::PTR,
        }
    }

    /// Parse a type-specific value given in presentation format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if `value` isn't an address of the right family (A/AAAA),
    /// or a valid domain name (MX/CNAME/PTR).
    pub fn parse_value(self, value: &str, preference: u16) -> Result<RecordData, Error> {
        let invalid = || Error::InvalidValue {
            rtype: self.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();
        Ok(match self {
            Kind::A => RecordData::A(value.parse().map_err(|_| invalid())?),
            Kind::Aaaa => RecordData::Aaaa(value.parse().map_err(|_| invalid())?),
            Kind::Mx => RecordData::Mx {
                preference,
                exchange: fqdn(value).map_err(|_| invalid())?,
            },
            Kind::Cname => RecordData::Cname(fqdn(value).map_err(|_| invalid())?),
            Kind::Ptr => RecordData::Ptr(fqdn(value).map_err(|_| invalid())?),
        })
    }
}

impl TryFrom<RecordType> for Kind {
    type Error = Error;

    fn try_from(rtype: RecordType) -> Result<Self, Error> {
        match rtype {
            RecordType::A => Ok(Kind::A),
            RecordType::AAAA => Ok(Kind::Aaaa),
            RecordType::MX => Ok(Kind::Mx),
            RecordType::CNAME => Ok(Kind::Cname),
            RecordType::PTR => Ok(Kind::Ptr),
            other => Err(Error::UnsupportedType(other.to_string())),
        }
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(Kind::A),
            "AAAA" => Ok(Kind::Aaaa),
            "MX" => Ok(Kind::Mx),
            "CNAME" => Ok(Kind::Cname),
            "PTR" => Ok(Kind::Ptr),
            _ => Err(Error::UnsupportedType(s.to_string())),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.record_type(), f)
    }
}

/// Type-specific record data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Mx { preference: u16, exchange: Name },
    Cname(Name),
    Ptr(Name),
}

impl RecordData {
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            RecordData::A(_) => Kind::A,
            RecordData::Aaaa(_) => Kind::Aaaa,
            RecordData::Mx { .. } => Kind::Mx,
            RecordData::Cname(_) => Kind::Cname,
            RecordData::Ptr(_) => Kind::Ptr,
        }
    }

    fn to_rdata(&self) -> RData {
        match self {
            RecordData::A(ip) => RData::A(*ip),
            RecordData::Aaaa(ip) => RData::AAAA(*ip),
            RecordData::Mx {
                preference,
                exchange,
            } => RData::MX(MX::new(*preference, exchange.clone())),
            RecordData::Cname(target) => RData::CNAME(target.clone()),
            RecordData::Ptr(target) => RData::PTR(target.clone()),
        }
    }

    fn from_rdata(rdata: &RData) -> Result<Self, Error> {
        match rdata {
            RData::A(ip) => Ok(RecordData::A(*ip)),
            RData::AAAA(ip) => Ok(RecordData::Aaaa(*ip)),
            RData::MX(mx) => Ok(RecordData::Mx {
                preference: mx.preference(),
                exchange: mx.exchange().clone(),
            }),
            RData::CNAME(target) => Ok(RecordData::Cname(target.clone())),
            RData::PTR(target) => Ok(RecordData::Ptr(target.clone())),
            other => Err(Error::UnsupportedType(other.to_record_type().to_string())),
        }
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordData::A(ip) => write!(f, "{ip}"),
            RecordData::Aaaa(ip) => write!(f, "{ip}"),
            RecordData::Mx {
                preference,
                exchange,
            } => write!(f, "{preference} {}", exchange.to_ascii()),
            RecordData::Cname(target) | RecordData::Ptr(target) => {
                f.write_str(&target.to_ascii())
            }
        }
    }
}

/// A single Internet class resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: Name,
    pub ttl: u32,
    pub data: RecordData,
}

impl ResourceRecord {
    /// Build a record for `domain`, which is made fully qualified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDomain`] if `domain` is not a valid DNS name.
    pub fn new(domain: &str, ttl: u32, data: RecordData) -> Result<Self, Error> {
        Ok(ResourceRecord {
            name: fqdn(domain)?,
            ttl,
            data,
        })
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.data.kind()
    }

    #[must_use]
    pub fn record_type(&self) -> RecordType {
        self.kind().record_type()
    }

    /// The storage key this record is kept under.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDomain`] if the owner name can't be used as a key.
    pub fn key(&self) -> Result<String, Error> {
        keys::derive_key(&self.name.to_ascii(), self.record_type())
    }

    /// Convert a wire record, keeping its name, TTL and data but forcing the IN class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedType`] for record types outside the supported set, or for
    /// records without data.
    pub fn from_record(record: &Record) -> Result<Self, Error> {
        let rdata = record
            .data()
            .ok_or_else(|| Error::UnsupportedType(record.rr_type().to_string()))?;
        let mut name = record.name().clone();
        name.set_fqdn(true);
        Ok(ResourceRecord {
            name,
            ttl: record.ttl(),
            data: RecordData::from_rdata(rdata)?,
        })
    }

    #[must_use]
    pub fn to_record(&self) -> Record {
        let mut record = Record::from_rdata(self.name.clone(), self.ttl, self.data.to_rdata());
        record.set_dns_class(DNSClass::IN);
        record
    }

    /// The RFC-conformant reverse pointer for an address record: owned by the address's
    /// `in-addr.arpa.`/`ip6.arpa.` name, pointing at this record's owner. `None` for other
    /// record kinds.
    #[must_use]
    pub fn reverse_pointer(&self) -> Option<ResourceRecord> {
        let ip = match self.data {
            RecordData::A(ip) => IpAddr::V4(ip),
            RecordData::Aaaa(ip) => IpAddr::V6(ip),
            _ => return None,
        };
        Some(ResourceRecord {
            name: reverse_name(ip),
            ttl: self.ttl,
            data: RecordData::Ptr(self.name.clone()),
        })
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} IN {} {}",
            self.name.to_ascii(),
            self.ttl,
            self.kind(),
            self.data
        )
    }
}

impl FromStr for ResourceRecord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let malformed = || Error::InvalidValue {
            rtype: "RR".to_string(),
            value: s.to_string(),
        };
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [name, ttl, class, rtype, rdata @ ..] = fields.as_slice() else {
            return Err(malformed());
        };
        if !class.eq_ignore_ascii_case("IN") {
            return Err(malformed());
        }
        let ttl: u32 = ttl.parse().map_err(|_| malformed())?;
        let kind: Kind = rtype.parse()?;
        let data = match (kind, rdata) {
            (Kind::Mx, [preference, exchange]) => {
                let preference = preference.parse().map_err(|_| malformed())?;
                kind.parse_value(exchange, preference)?
            }
            (Kind::Mx, _) | (_, [] | [_, _, ..]) => return Err(malformed()),
            (_, [value]) => kind.parse_value(value, 0)?,
        };
        ResourceRecord::new(name, ttl, data)
    }
}

/// Parse `domain` into a fully qualified [`Name`].
///
/// # Errors
///
/// Returns [`Error::InvalidDomain`] if `domain` is not a valid DNS name.
pub fn fqdn(domain: &str) -> Result<Name, Error> {
    if !keys::is_domain_name(domain) {
        return Err(Error::InvalidDomain(domain.to_string()));
    }
    let mut name =
        Name::from_ascii(domain).map_err(|_| Error::InvalidDomain(domain.to_string()))?;
    name.set_fqdn(true);
    Ok(name)
}

/// The reverse lookup name of `ip`, e.g. `1.0.0.10.in-addr.arpa.` for `10.0.0.1`.
#[must_use]
pub fn reverse_name(ip: IpAddr) -> Name {
    let labels: Vec<String> = match ip {
        IpAddr::V4(v4) => v4
            .octets()
            .iter()
            .rev()
            .map(ToString::to_string)
            .chain(["in-addr".to_string(), "arpa".to_string()])
            .collect(),
        IpAddr::V6(v6) => v6
            .octets()
            .iter()
            .rev()
            .flat_map(|b| [b & 0x0f, b >> 4])
            .map(|nibble| format!("{nibble:x}"))
            .chain(["ip6".to_string(), "arpa".to_string()])
            .collect(),
    };
    // NB: the labels are plain ASCII digits/hex and fixed suffixes, always a valid name.
    let mut name = Name::from_labels(labels.iter().map(String::as_str))
        .unwrap_or_else(|_| Name::root());
    name.set_fqdn(true);
    name
}
