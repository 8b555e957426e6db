//! The message envelope exchanged over streams.
//!
//! An envelope is either a **fresh request** (`referer` unset) or a
//! **reply** routed to a response handler (`referer` set to the original
//! request). Payload bytes are base64-encoded on the wire.
//!
//! ```text
//! fresh:  service_type=Ping payload_type=Ping payload=<Ping>
//! reply:  service_type=Ping payload_type=Pong payload=<Pong>
//!         referer_type=Ping referer=<Ping> | error="…"
//! ```

use bytes::Bytes;
use chrono::{DateTime, Utc};
use herald_core::{codec, HeraldError, HeraldResult, Request, RequestContext};
use serde::{Deserialize, Serialize};

/// Wire envelope for distributed requests and replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Type identity of the request this message concerns.
    pub service_type: String,

    /// Type identity of `payload`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<String>,

    /// Serialized request (fresh) or handler result (reply).
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Bytes>,

    /// Handler error text on a failed reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Type identity of `referer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer_type: Option<String>,

    /// The original request, set only on replies.
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub referer: Option<Bytes>,

    /// Consumer group of the sender.
    pub group_name: String,

    /// Machine name of the sender.
    pub machine_name: String,

    /// When the message was created.
    pub creation_date: DateTime<Utc>,

    /// Credential forwarded to the remote handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,

    /// Correlation id forwarded to the remote handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Whether the sender wants a reply.
    #[serde(default)]
    pub respond: bool,
}

impl Message {
    /// Builds the envelope for a fresh request.
    pub fn request<R: Request>(
        request: &R,
        respond: bool,
        ctx: &RequestContext,
        group_name: &str,
        machine_name: &str,
    ) -> HeraldResult<Self> {
        Ok(Self {
            service_type: R::type_identity().to_string(),
            payload_type: Some(R::type_identity().to_string()),
            payload: Some(codec::encode(request)?),
            error: None,
            referer_type: None,
            referer: None,
            group_name: group_name.to_string(),
            machine_name: machine_name.to_string(),
            creation_date: Utc::now(),
            authorization: ctx.authorization().map(ToString::to_string),
            request_id: Some(ctx.request_id().to_string()),
            respond,
        })
    }

    /// Returns `true` if this message is a reply for a response handler.
    #[must_use]
    pub const fn is_reply(&self) -> bool {
        self.referer.is_some()
    }

    /// Builds the outgoing message for processing this one.
    ///
    /// A fresh request becomes the referer of the outgoing reply; a reply
    /// carries its referer through. Payload, payload type and error start
    /// empty and are filled once the handler has run.
    #[must_use]
    pub fn outgoing(&self, group_name: &str, machine_name: &str) -> Self {
        let (referer_type, referer) = if self.is_reply() {
            (self.referer_type.clone(), self.referer.clone())
        } else {
            (self.payload_type.clone(), self.payload.clone())
        };
        Self {
            service_type: self.service_type.clone(),
            payload_type: None,
            payload: None,
            error: None,
            referer_type,
            referer,
            group_name: group_name.to_string(),
            machine_name: machine_name.to_string(),
            creation_date: Utc::now(),
            authorization: self.authorization.clone(),
            request_id: self.request_id.clone(),
            respond: false,
        }
    }

    /// Serializes the envelope.
    pub fn encode(&self) -> HeraldResult<Bytes> {
        codec::encode(self)
    }

    /// Deserializes an envelope.
    pub fn decode(bytes: &[u8]) -> HeraldResult<Self> {
        codec::decode(bytes)
    }

    /// Decodes the payload as `T`.
    pub fn decode_payload<T: serde::de::DeserializeOwned>(&self) -> HeraldResult<T> {
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| HeraldError::internal("message has no payload"))?;
        codec::decode(payload)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Bytes>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| {
                STANDARD
                    .decode(encoded)
                    .map(Bytes::from)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
