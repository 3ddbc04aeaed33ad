//! Transaction signatures ([RFC-8945][RFC-8945]).
//!
//! The record format and MAC computation come from `trust-dns-proto`'s TSIG support. This module
//! adds the server policy on top: which key is accepted, and which TSIG error a failing request
//! gets. MACs cover the exact octets of a message, so signing works on encoded messages.
//!
//! [RFC-8945]: https://www.rfc-editor.org/rfc/rfc8945

use crate::error::Error;
use base64::engine::general_purpose;
use base64::Engine;
use std::fmt;
use std::str::FromStr;
use trust_dns_proto::error::{ProtoError, ProtoResult};
use trust_dns_proto::op::{Header, Message};
use trust_dns_proto::rr::dnssec::rdata::tsig::{
    self as tsig_rdata, make_tsig_record, message_tbs, signed_bitmessage_to_buf, TsigAlgorithm, TSIG,
};
use trust_dns_proto::rr::dnssec::rdata::DNSSECRData;
use trust_dns_proto::rr::{Name, RData, RecordType};
use trust_dns_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncodable, BinEncoder};

/// Fudge applied to every signature produced by this server.
pub const FUDGE: u16 = 300;

/// The TSIG MAC algorithms that can be configured.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Algorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    /// Match the algorithm of a received TSIG record.
    #[must_use]
    pub fn from_tsig(algorithm: &TsigAlgorithm) -> Option<Self> {
        match algorithm {
            TsigAlgorithm::HmacSha256 => Some(Algorithm::Sha256),
            TsigAlgorithm::HmacSha384 => Some(Algorithm::Sha384),
            TsigAlgorithm::HmacSha512 => Some(Algorithm::Sha512),
            TsigAlgorithm::Unknown(name) => name.to_ascii().trim_end_matches('.').parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn tsig_algorithm(self) -> TsigAlgorithm {
        match self {
            Algorithm::Sha256 => TsigAlgorithm::HmacSha256,
            Algorithm::Sha384 => TsigAlgorithm::HmacSha384,
            Algorithm::Sha512 => TsigAlgorithm::HmacSha512,
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Sha256
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "hmac-sha256" => Ok(Algorithm::Sha256),
            "hmac-sha384" => Ok(Algorithm::Sha384),
            "hmac-sha512" => Ok(Algorithm::Sha512),
            _ => Err(Error::UnsupportedType(s.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tsig_algorithm())
    }
}

/// The TSIG error field values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TsigRcode {
    NoError,
    BadSig,
    BadKey,
    BadTime,
    Other(u16),
}

impl From<TsigRcode> for u16 {
    fn from(rcode: TsigRcode) -> Self {
        match rcode {
            TsigRcode::NoError => 0,
            TsigRcode::BadSig => 16,
            TsigRcode::BadKey => 17,
            TsigRcode::BadTime => 18,
            TsigRcode::Other(value) => value,
        }
    }
}

impl From<u16> for TsigRcode {
    fn from(value: u16) -> Self {
        match value {
            0 => TsigRcode::NoError,
            16 => TsigRcode::BadSig,
            17 => TsigRcode::BadKey,
            18 => TsigRcode::BadTime,
            other => TsigRcode::Other(other),
        }
    }
}

impl fmt::Display for TsigRcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TsigRcode::NoError => f.write_str("NOERROR"),
            TsigRcode::BadSig => f.write_str("BADSIG"),
            TsigRcode::BadKey => f.write_str("BADKEY"),
            TsigRcode::BadTime => f.write_str("BADTIME"),
            TsigRcode::Other(value) => write!(f, "RCODE{value}"),
        }
    }
}

/// A shared secret used to sign and verify messages.
#[derive(Clone)]
pub struct TsigKey {
    name: Name,
    algorithm: Algorithm,
    secret: Vec<u8>,
}

impl fmt::Debug for TsigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TsigKey")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TsigKey {
    #[must_use]
    pub fn new(name: Name, algorithm: Algorithm, secret: &[u8]) -> Self {
        let mut name = name.to_lowercase();
        name.set_fqdn(true);
        TsigKey {
            name,
            algorithm,
            secret: secret.to_vec(),
        }
    }

    /// Build a key from its name and base64 encoded secret, as written in the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDomain`] for a bad key name and [`Error::InvalidSecret`] if the
    /// secret isn't base64.
    pub fn from_base64(name: &str, algorithm: Algorithm, secret: &str) -> Result<Self, Error> {
        let name = crate::record::fqdn(name)?;
        let secret = general_purpose::STANDARD.decode(secret.trim())?;
        Ok(Self::new(name, algorithm, &secret))
    }

    #[must_use]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Check the signature read off a request.
    ///
    /// # Errors
    ///
    /// Returns the TSIG error to report: [`TsigRcode::BadKey`] for another key or algorithm,
    /// [`TsigRcode::BadSig`] for a MAC mismatch, [`TsigRcode::BadTime`] if the signature time is
    /// outside of its fudge window around `now`.
    pub fn verify_request(&self, request: &MessageTsig, now: u64) -> Result<(), TsigRcode> {
        self.check_key(request)?;
        self.check_mac(request)?;
        request.check_time(now)
    }

    /// Append a TSIG record answering the signed `request` to the encoded `response`.
    ///
    /// For [`TsigRcode::BadTime`] the request's time is echoed and the server time goes into
    /// the other data, so the client can verify the answer and learn the clock skew.
    ///
    /// # Errors
    ///
    /// Returns an error if `response` isn't an encoded message or grows too large.
    pub fn sign_response(
        &self,
        response: &mut Vec<u8>,
        request: &MessageTsig,
        error: TsigRcode,
        now: u64,
    ) -> ProtoResult<()> {
        let id = read_header(response)?.id();
        let unsigned = if error == TsigRcode::BadTime {
            TSIG::new(
                self.algorithm.tsig_algorithm(),
                request.tsig.time(),
                request.tsig.fudge(),
                Vec::new(),
                id,
                error.into(),
                time48(now).to_vec(),
            )
        } else {
            TSIG::new(
                self.algorithm.tsig_algorithm(),
                now,
                FUDGE,
                Vec::new(),
                id,
                error.into(),
                Vec::new(),
            )
        };
        self.sign(response, Some(request.mac()), unsigned).map(drop)
    }

    /// Sign an encoded request, returning the MAC needed to verify its response.
    ///
    /// # Errors
    ///
    /// Returns an error if `request` isn't an encoded message or grows too large.
    pub fn sign_request(&self, request: &mut Vec<u8>, now: u64) -> ProtoResult<Vec<u8>> {
        let unsigned = TSIG::new(
            self.algorithm.tsig_algorithm(),
            now,
            FUDGE,
            Vec::new(),
            read_header(request)?.id(),
            TsigRcode::NoError.into(),
            Vec::new(),
        );
        self.sign(request, None, unsigned)
    }

    /// Verify the signed `response` to a request signed with MAC `request_mac`.
    ///
    /// # Errors
    ///
    /// Returns the TSIG error carried by the response, or the error detected locally.
    pub fn verify_response(
        &self,
        response: &[u8],
        request_mac: &[u8],
        now: u64,
    ) -> Result<(), TsigRcode> {
        let tsig = MessageTsig::read(Some(request_mac), response).map_err(|_| TsigRcode::BadSig)?;
        self.check_key(&tsig)?;
        if tsig.error != TsigRcode::NoError {
            return Err(tsig.error);
        }
        self.check_mac(&tsig)?;
        tsig.check_time(now)
    }

    fn sign(
        &self,
        message: &mut Vec<u8>,
        previous_mac: Option<&[u8]>,
        unsigned: TSIG,
    ) -> ProtoResult<Vec<u8>> {
        let tbs = message_tbs(previous_mac, &Encoded(message.as_slice()), &unsigned, &self.name)?;
        let mac = self.algorithm.tsig_algorithm().mac_data(&self.secret, &tbs)?;
        append_tsig(message, self.name.clone(), unsigned.set_mac(mac.clone()))?;
        Ok(mac)
    }

    fn check_key(&self, tsig: &MessageTsig) -> Result<(), TsigRcode> {
        if tsig.key_name == self.name
            && Algorithm::from_tsig(tsig.tsig.algorithm()) == Some(self.algorithm)
        {
            Ok(())
        } else {
            Err(TsigRcode::BadKey)
        }
    }

    fn check_mac(&self, tsig: &MessageTsig) -> Result<(), TsigRcode> {
        self.algorithm
            .tsig_algorithm()
            .verify_mac(&self.secret, &tsig.signed_data, tsig.mac())
            .map_err(|_| TsigRcode::BadSig)
    }
}

/// Append an unsigned TSIG record reporting `error` (BADKEY or BADSIG) for `request`.
///
/// # Errors
///
/// Returns an error if `response` isn't an encoded message or grows too large.
pub fn append_unsigned_error(
    response: &mut Vec<u8>,
    request: &MessageTsig,
    error: TsigRcode,
    now: u64,
) -> ProtoResult<()> {
    let unsigned = TSIG::new(
        request.tsig.algorithm().clone(),
        now,
        FUDGE,
        Vec::new(),
        read_header(response)?.id(),
        error.into(),
        Vec::new(),
    );
    append_tsig(response, request.key_name.clone(), unsigned)
}

/// Whether the decoded `message` ends with a TSIG record.
#[must_use]
pub fn is_signed(message: &Message) -> bool {
    message
        .sig0()
        .last()
        .map_or(false, |record| record.rr_type() == RecordType::TSIG)
}

/// The TSIG record of a signed wire message, with the data its MAC covers.
#[derive(Clone, Debug)]
pub struct MessageTsig {
    key_name: Name,
    tsig: TSIG,
    error: TsigRcode,
    signed_data: Vec<u8>,
}

impl MessageTsig {
    /// Split the trailing TSIG record off `message`. `previous_mac` is the request MAC when
    /// `message` is a response.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is malformed or its last record isn't a TSIG record.
    pub fn read(previous_mac: Option<&[u8]>, message: &[u8]) -> ProtoResult<Self> {
        let (signed_data, record) = signed_bitmessage_to_buf(previous_mac, message, true)?;
        let key_name = record.name().clone();
        let tsig = match record.into_data() {
            Some(RData::DNSSEC(DNSSECRData::TSIG(tsig))) => tsig,
            _ => return Err("signature is not tsig".into()),
        };
        Ok(MessageTsig {
            key_name,
            error: error_field(&tsig)?,
            tsig,
            signed_data,
        })
    }

    #[must_use]
    pub fn key_name(&self) -> &Name {
        &self.key_name
    }

    #[must_use]
    pub fn mac(&self) -> &[u8] {
        self.tsig.mac()
    }

    #[must_use]
    pub fn error(&self) -> TsigRcode {
        self.error
    }

    fn check_time(&self, now: u64) -> Result<(), TsigRcode> {
        if now.abs_diff(self.tsig.time()) > u64::from(self.tsig.fudge()) {
            Err(TsigRcode::BadTime)
        } else {
            Ok(())
        }
    }
}

/// An encoded message, so that MACs cover the octets sent on the wire.
struct Encoded<'a>(&'a [u8]);

impl BinEncodable for Encoded<'_> {
    fn emit(&self, encoder: &mut BinEncoder<'_>) -> ProtoResult<()> {
        encoder.emit_vec(self.0)
    }
}

fn append_tsig(message: &mut Vec<u8>, key_name: Name, tsig: TSIG) -> ProtoResult<()> {
    let mut header = read_header(message)?;
    let additionals = header
        .additional_count()
        .checked_add(1)
        .ok_or_else(|| ProtoError::from("too many additional records"))?;
    header.set_additional_count(additionals);

    let end = message.len();
    let mut encoder = BinEncoder::new(message);
    encoder.set_canonical_names(true);
    header.emit(&mut encoder)?;
    encoder.set_offset(end);
    make_tsig_record(key_name, tsig).emit(&mut encoder)
}

fn read_header(message: &[u8]) -> ProtoResult<Header> {
    Header::read(&mut BinDecoder::new(message))
}

/// The rdata type has no accessor for the error field.
fn error_field(tsig: &TSIG) -> ProtoResult<TsigRcode> {
    let mut wire = Vec::new();
    tsig_rdata::emit(&mut BinEncoder::new(&mut wire), tsig)?;

    let mut decoder = BinDecoder::new(&wire);
    TsigAlgorithm::read(&mut decoder)?;
    // time signed and fudge
    decoder.read_slice(8)?;
    let mac_len = decoder.read_u16()?.unverified();
    // mac and original id
    decoder.read_slice(usize::from(mac_len) + 2)?;
    Ok(decoder.read_u16()?.unverified().into())
}

fn time48(time: u64) -> [u8; 6] {
    let octets = time.to_be_bytes();
    [octets[2], octets[3], octets[4], octets[5], octets[6], octets[7]]
}
