//! Wire message passthrough for forwarders.
//!
//! A forwarding DNS daemon can hand raw query messages to ddns over another transport (see the
//! [`/dns-query` endpoint][crate::api]) and get raw responses back, answered by the same engine
//! as the UDP listener. Only queries are served this way: dynamic updates must come over UDP.

use crate::dns::handlers::{encode, error_response, Handler};
use crate::error::Error;
use trust_dns_proto::op::{Message, OpCode, ResponseCode};

#[derive(Clone)]
pub struct Bridge {
    handler: Handler,
}

impl Bridge {
    #[must_use]
    pub fn new(handler: Handler) -> Self {
        Bridge { handler }
    }

    /// Answer the wire message `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `raw` isn't a DNS message and [`Error::Encode`] if the
    /// response can't be serialized.
    pub async fn query(&self, raw: &[u8]) -> Result<Vec<u8>, Error> {
        let request = Message::from_vec(raw).map_err(Error::Decode)?;
        let response = match request.op_code() {
            OpCode::Query => self.handler.handle_query(&request).await,
            _ => error_response(&request, ResponseCode::NotImp),
        };
        encode(&response)
    }
}
