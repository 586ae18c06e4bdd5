//! Server-Sent Events framing
//!
//! Encodes the gateway's internal event stream into the wire protocol the
//! browser consumes: one `data: {"content": ...}` frame per chunk, errors as
//! a dedicated `error` event, and a final `data: [DONE]` sentinel after
//! which the connection closes. Frames are written in production order; the
//! sentinel is always the last line on every path.

use crate::gateway::StreamEvent;
use axum::http::header::{CACHE_CONTROL, CONNECTION};
use axum::http::HeaderValue;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;

/// Build the streaming HTTP response for a gateway event stream.
///
/// Intermediary buffering is disabled via `X-Accel-Buffering` so each frame
/// reaches the client as soon as it is produced. No keep-alive comments are
/// injected: active streams emit data continuously, and nothing may follow
/// the sentinel.
pub fn response<S>(events: S) -> Response
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let frames = events.map(|event| Ok::<_, Infallible>(frame(event)));
    let mut response = Sse::new(frames).into_response();

    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));

    response
}

fn frame(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Chunk(content) => {
            Event::default().data(json!({ "content": content }).to_string())
        }
        StreamEvent::Error(message) => Event::default()
            .event("error")
            .data(json!({ "error": message }).to_string()),
        StreamEvent::Done => Event::default().data("[DONE]"),
    }
}
