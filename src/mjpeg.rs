//! Motion-JPEG over `multipart/x-mixed-replace`.
//!
//! Browsers render this natively from `<img src="/video">`, replacing the
//! image with every new part.

use std::convert::Infallible;

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream;

use crate::streaming::FrameSubscriber;

/// Boundary token shared by the response header and every part.
pub const BOUNDARY: &str = "frame";

pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Frames one JPEG as a multipart body part.
pub fn encode_part(jpeg: &[u8]) -> Bytes {
    let head = format!(
        "--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {len}\r\n\r\n",
        boundary = BOUNDARY,
        len = jpeg.len()
    );

    let mut part = BytesMut::with_capacity(head.len() + jpeg.len() + 2);
    part.put_slice(head.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Streams every frame `subscriber` receives as one part.
///
/// The body ends only when the connection does: hyper drops the stream on a
/// failed write, which drops the subscriber.
pub fn stream_response(subscriber: FrameSubscriber) -> Response {
    let parts = stream::unfold(subscriber, |mut subscriber| async move {
        let frame = subscriber.recv().await?;
        Some((Ok::<_, Infallible>(encode_part(frame.jpeg())), subscriber))
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE)),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store, must-revalidate"),
            ),
            (header::PRAGMA, HeaderValue::from_static("no-cache")),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}
