//! Header hygiene for forwarded requests and relayed responses.

use http::header::{
    ACCEPT_ENCODING, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, HOST, TRANSFER_ENCODING,
};
use http::{HeaderMap, HeaderName};

/// Dropped from client requests before forwarding.
///
/// The body may be rewritten, so its length and framing no longer apply.
/// `accept-encoding` is dropped so the upstream answers uncompressed: the
/// client does not decode bodies and buffered responses lose their
/// `content-encoding`.
pub const REQUEST_STRIP: &[HeaderName] = &[
    HOST,
    CONTENT_LENGTH,
    TRANSFER_ENCODING,
    CONNECTION,
    ACCEPT_ENCODING,
];

/// Dropped from buffered upstream responses.
pub const BUFFERED_RESPONSE_STRIP: &[HeaderName] =
    &[CONTENT_ENCODING, TRANSFER_ENCODING, CONTENT_LENGTH, CONNECTION];

/// Dropped from streamed upstream responses; the server re-frames the body.
pub const STREAMING_RESPONSE_STRIP: &[HeaderName] = &[TRANSFER_ENCODING, CONNECTION];

/// Copy of `headers` without the listed names
pub fn without(headers: &HeaderMap, names: &[HeaderName]) -> HeaderMap {
    let mut filtered = headers.clone();
    for name in names {
        filtered.remove(name);
    }
    filtered
}
