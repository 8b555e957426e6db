//! JSON codec for request payloads.
//!
//! Payloads travel as opaque bytes inside the message envelope. Herald
//! encodes them as JSON.

use crate::error::{HeraldError, HeraldResult};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

/// Serializes a value into payload bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> HeraldResult<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(HeraldError::codec::<T>)
}

/// Deserializes payload bytes into a value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> HeraldResult<T> {
    serde_json::from_slice(bytes).map_err(HeraldError::codec::<T>)
}
