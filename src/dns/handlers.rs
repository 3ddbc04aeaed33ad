use crate::config::SharedConfig;
use crate::dns::tsig::{self, MessageTsig, TsigKey, TsigRcode};
use crate::error::Error;
use crate::keys::derive_key;
use crate::record::{Kind, ResourceRecord};
use crate::record_store::{DynRecordStore, StoredRecord};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use trust_dns_proto::op::{Message, MessageType, OpCode, ResponseCode};
use trust_dns_proto::rr::{DNSClass, Record, RecordType};
use trust_dns_proto::serialize::binary::{BinEncodable, BinEncoder};

/// DNS messages shorter than a header are dropped without an answer.
const HEADER_LEN: usize = 12;

/// The protocol engine: answers queries and applies dynamic updates against the record store.
#[derive(Clone)]
pub struct Handler {
    config: SharedConfig,
    store: DynRecordStore,
    tsig_key: Option<TsigKey>,
}

impl Handler {
    /// # Errors
    ///
    /// Returns an error if the configured TSIG key is malformed.
    pub fn new(config: SharedConfig, store: DynRecordStore) -> Result<Self, Error> {
        let tsig_key = config.tsig_key()?;
        Ok(Handler {
            config,
            store,
            tsig_key,
        })
    }

    /// Handle one wire message, returning the wire response to send back, if any.
    ///
    /// A signature that fails verification is logged and reported in the TSIG of the answer.
    /// Queries are still answered, anything else is refused with NOTAUTH.
    pub async fn handle_datagram(&self, datagram: &[u8]) -> Option<Vec<u8>> {
        if datagram.len() < HEADER_LEN {
            debug!("dropping {} byte datagram", datagram.len());
            return None;
        }

        let request = match Message::from_vec(datagram) {
            Ok(request) => request,
            Err(err) => {
                debug!("malformed message: {err}");
                return format_error(datagram);
            }
        };
        if request.message_type() != MessageType::Query {
            debug!("ignoring response message {}", request.id());
            return None;
        }
        let signature = if tsig::is_signed(&request) {
            match MessageTsig::read(None, datagram) {
                Ok(signature) => Some(signature),
                Err(err) => {
                    debug!("malformed signature: {err}");
                    return format_error(datagram);
                }
            }
        } else {
            None
        };

        let now = now_secs(unix_now());
        let verdict = signature.as_ref().map(|signature| match &self.tsig_key {
            Some(key) => key.verify_request(signature, now),
            None => Err(TsigRcode::BadKey),
        });
        if let (Some(signature), Some(Err(error))) = (&signature, verdict) {
            warn!(
                "message {} signed by \"{}\": {}",
                request.id(),
                signature.key_name(),
                Error::Auth(error)
            );
            if request.op_code() != OpCode::Query {
                return self.reject_signature(&request, signature, error, now);
            }
        }

        let response = match request.op_code() {
            OpCode::Query => self.handle_query(&request).await,
            OpCode::Update => self.handle_update(&request, verdict == Some(Ok(()))).await,
            op_code => {
                debug!("unsupported opcode {op_code:?}");
                error_response(&request, ResponseCode::NotImp)
            }
        };

        let mut response = match encode(&response) {
            Ok(response) => response,
            Err(err) => {
                warn!("failed to encode response to {}: {err}", request.id());
                return None;
            }
        };
        if let (Some(signature), Some(verdict)) = (&signature, verdict) {
            if let Err(err) = self.sign(&mut response, signature, verdict, now) {
                warn!("failed to sign response to {}: {err}", request.id());
                return None;
            }
        }
        Some(response)
    }

    /// Answer every question of `request` from the store.
    ///
    /// Questions that can't be answered are skipped. If none could be answered the response is
    /// NXDOMAIN.
    pub async fn handle_query(&self, request: &Message) -> Message {
        let mut response = response_to(request);
        for query in request.queries() {
            let name = query.name();
            let query_type = query.query_type();
            match self.lookup(&name.to_ascii(), query_type).await {
                Ok(rr) if rr.name == *name => {
                    response.add_answer(rr.to_record());
                }
                Ok(rr) => debug!("{name} {query_type}: stored record is owned by {}", rr.name),
                Err(err) if err.is_not_found() => debug!("{name} {query_type}: no record"),
                Err(err) => warn!("{name} {query_type}: {err}"),
            }
        }
        if response.answers().is_empty() {
            response.set_response_code(ResponseCode::NXDomain);
        }
        response
    }

    /// Apply the update instructions of `request` in order.
    ///
    /// Failing instructions are logged and skipped, the response is always NOERROR unless the
    /// update is refused for lack of authentication.
    pub async fn handle_update(&self, request: &Message, authenticated: bool) -> Message {
        if !authenticated && self.config.require_authenticated_updates {
            warn!("refused unsigned update {}", request.id());
            return error_response(request, ResponseCode::Refused);
        }

        let zone = request
            .queries()
            .first()
            .map(|zone| zone.name().to_string())
            .unwrap_or_default();
        let now = unix_now();
        for update in request.name_servers() {
            if let Err(err) = self.apply_update(update, now).await {
                warn!(
                    "zone \"{zone}\": skipped update of {} {}: {err}",
                    update.name(),
                    update.rr_type()
                );
            }
        }
        response_to(request)
    }

    async fn apply_update(&self, update: &Record, now: i64) -> Result<(), Error> {
        let domain = update.name().to_ascii();
        let rtype = update.rr_type();
        let key = derive_key(&domain, rtype)?;

        if update.dns_class() == DNSClass::ANY && update.data().is_none() {
            return match self.store.delete(&key).await {
                Ok(()) => {
                    info!("deleted {domain} {rtype}");
                    Ok(())
                }
                Err(err) if err.is_not_found() => {
                    debug!("delete of {domain} {rtype}: no record");
                    Ok(())
                }
                Err(err) => Err(err),
            };
        }

        let rr = ResourceRecord::from_record(update)?;
        if !matches!(rr.kind(), Kind::A | Kind::Aaaa) {
            warn!("dynamic updates of {rtype} records are not supported, skipping {domain}");
            return Ok(());
        }
        let expires = self.config.update_expiry.map_or(0, |expiry| {
            now.saturating_add(i64::try_from(expiry.as_secs()).unwrap_or(i64::MAX))
        });
        self.store.put(&key, StoredRecord::new(&rr, expires)).await?;
        info!("added {rr}");
        Ok(())
    }

    async fn lookup(&self, domain: &str, record_type: RecordType) -> Result<ResourceRecord, Error> {
        let key = derive_key(domain, record_type)?;
        self.store.get(&key).await?.record(&key)
    }

    fn reject_signature(
        &self,
        request: &Message,
        signature: &MessageTsig,
        error: TsigRcode,
        now: u64,
    ) -> Option<Vec<u8>> {
        let mut response = encode(&error_response(request, ResponseCode::NotAuth)).ok()?;
        self.sign(&mut response, signature, Err(error), now).ok()?;
        Some(response)
    }

    /// Attach the TSIG answering `signature`. Only a verified request or a stale one is answered
    /// with a MAC, other failures get an unsigned TSIG carrying the error.
    fn sign(
        &self,
        response: &mut Vec<u8>,
        signature: &MessageTsig,
        verdict: Result<(), TsigRcode>,
        now: u64,
    ) -> Result<(), Error> {
        match (&self.tsig_key, verdict) {
            (Some(key), Ok(())) => key.sign_response(response, signature, TsigRcode::NoError, now),
            (Some(key), Err(TsigRcode::BadTime)) => {
                key.sign_response(response, signature, TsigRcode::BadTime, now)
            }
            // Without a key nothing verifies.
            (_, verdict) => tsig::append_unsigned_error(
                response,
                signature,
                verdict.err().unwrap_or(TsigRcode::BadKey),
                now,
            ),
        }
        .map_err(Error::Encode)
    }
}

/// Encode `message` without name compression.
///
/// # Errors
///
/// Returns [`Error::Encode`] if the message can't be serialized.
pub fn encode(message: &Message) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut buf);
    encoder.set_canonical_names(true);
    message.emit(&mut encoder).map_err(Error::Encode)?;
    Ok(buf)
}

/// An authoritative response echoing the header and questions of `request`.
pub(crate) fn response_to(request: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_authoritative(true)
        .set_recursion_desired(request.recursion_desired())
        .add_queries(request.queries().iter().cloned());
    response
}

pub(crate) fn error_response(request: &Message, response_code: ResponseCode) -> Message {
    let mut response = response_to(request);
    response.set_response_code(response_code);
    response
}

/// A FORMERR answer built from nothing but the header ID of an undecodable message.
fn format_error(datagram: &[u8]) -> Option<Vec<u8>> {
    let mut response = Message::new();
    response
        .set_id(u16::from_be_bytes([datagram[0], datagram[1]]))
        .set_message_type(MessageType::Response)
        .set_response_code(ResponseCode::FormErr);
    encode(&response).ok()
}

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn now_secs(now: i64) -> u64 {
    u64::try_from(now).unwrap_or_default()
}
