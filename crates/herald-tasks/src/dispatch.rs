//! The seam between the runners and the local dispatcher.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use herald_core::{HeraldResult, RequestContext};

/// A serialized handler result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedOutput {
    /// Type identity of the output.
    pub payload_type: String,
    /// Serialized output.
    pub payload: Bytes,
}

/// Runs locally registered handlers for delivered envelopes.
///
/// Implemented by the dispatcher; the runners only see serialized payloads
/// and type identities.
pub trait LocalDispatch: Send + Sync + 'static {
    /// Decodes `payload` as the request named `service_type`, runs its
    /// request handler through the pipeline chain and serializes the result.
    fn handle_request<'a>(
        &'a self,
        ctx: RequestContext,
        service_type: &'a str,
        payload: &'a [u8],
    ) -> BoxFuture<'a, HeraldResult<EncodedOutput>>;

    /// Decodes `referer` as the original request and `payload` as its
    /// result, then runs the response handler for `service_type`.
    fn handle_reply<'a>(
        &'a self,
        ctx: RequestContext,
        service_type: &'a str,
        referer: &'a [u8],
        payload: Option<&'a [u8]>,
        error: Option<&'a str>,
    ) -> BoxFuture<'a, HeraldResult<()>>;
}
