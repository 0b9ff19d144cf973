//! Watch streams: framed sequences of [`WatchEvent`]s.
//!
//! Each frame holds one event encoded with the stream's serializer. The
//! changed object travels inside the event as raw JSON written by the
//! embedded encoder, and is read back with the embedded decoder.
use std::sync::Arc;

use apimachinery_core::{EventType, Object, RawExtension, WatchEvent};
use bytes::Bytes;
use futures::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::{decode, encode, framer::{FrameCodec, Framer}, Decoder, Encoder};
use crate::error::{Error, Result};

/// One decoded watch event.
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened
    pub type_: EventType,
    /// The object it happened to
    pub object: Box<dyn Object>,
}

/// Writes watch events to a byte stream.
pub struct WatchEncoder<W> {
    sink: FramedWrite<W, FrameCodec>,
    encoder: Arc<dyn Encoder>,
    embedded: Arc<dyn Encoder>,
}

impl<W: AsyncWrite + Unpin> WatchEncoder<W> {
    /// Frame events with `framer`, encode them with `encoder` and their objects with `embedded`.
    ///
    /// `embedded` must write JSON.
    pub fn new(writer: W, framer: Framer, encoder: Arc<dyn Encoder>, embedded: Arc<dyn Encoder>) -> Self {
        Self {
            sink: FramedWrite::new(writer, framer.codec()),
            encoder,
            embedded,
        }
    }

    /// Write and flush one event
    pub async fn send(&mut self, type_: EventType, object: &dyn Object) -> Result<()> {
        let raw = encode(self.embedded.as_ref(), object)?;
        let event = WatchEvent {
            type_,
            object: RawExtension::from_raw(raw),
            ..WatchEvent::default()
        };
        let frame = encode(self.encoder.as_ref(), &event)?;
        self.sink.send(Bytes::from(frame)).await
    }

    /// Flush and close the underlying writer
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await
    }

    /// The underlying writer
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }
}

fn decode_event(frame: &[u8], decoder: &dyn Decoder, embedded: &dyn Decoder) -> Result<Event> {
    let event = decoder
        .decode(frame, None, Some(Box::new(WatchEvent::default())))?
        .into_typed::<WatchEvent>()?;
    if event.object.raw.is_empty() {
        return Err(Error::BadRequest(format!("{} watch event carries no object", event.type_)));
    }
    let object = decode(embedded, &event.object.raw)?;
    Ok(Event {
        type_: event.type_,
        object,
    })
}

/// Read watch events from a byte stream.
///
/// The stream ends when the reader does. A frame that fails to decode yields
/// an error item; reading continues with the next frame.
pub fn watch_events<R>(
    reader: R,
    framer: Framer,
    decoder: Arc<dyn Decoder>,
    embedded: Arc<dyn Decoder>,
) -> impl Stream<Item = Result<Event>> + Send + Unpin
where
    R: AsyncRead + Send + Unpin,
{
    FramedRead::new(reader, framer.codec()).map(move |frame| {
        let event = decode_event(&frame?, decoder.as_ref(), embedded.as_ref());
        if let Err(e) = &event {
            tracing::debug!(error = %e, "failed to decode watch event");
        }
        event
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        serializer::{json, protobuf},
        testing::{self, Gadget},
    };
    use futures::TryStreamExt;

    async fn round_trip(framer: Framer, outer: Arc<dyn Encoder>, outer_decoder: Arc<dyn Decoder>) {
        let scheme = Arc::new(testing::scheme());
        let embedded = Arc::new(json::Serializer::json(scheme.clone(), scheme));
        let mut encoder = WatchEncoder::new(Vec::new(), framer, outer, embedded.clone());
        encoder.send(EventType::Added, &testing::gadget("a", 1)).await.unwrap();
        encoder.send(EventType::Modified, &testing::gadget("a", 2)).await.unwrap();
        encoder.send(EventType::Deleted, &testing::gadget("a", 2)).await.unwrap();
        let written = encoder.into_inner();

        let events = watch_events(&written[..], framer, outer_decoder, embedded)
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        let seen = events
            .into_iter()
            .map(|e| (e.type_, e.object.downcast_ref::<Gadget>().map(|g| g.size)))
            .collect::<Vec<_>>();
        assert_eq!(seen, [
            (EventType::Added, Some(1)),
            (EventType::Modified, Some(2)),
            (EventType::Deleted, Some(2)),
        ]);
    }

    #[tokio::test]
    async fn events_survive_every_framing() {
        let scheme = Arc::new(testing::scheme());
        let json = Arc::new(json::Serializer::json(scheme.clone(), scheme.clone()));
        round_trip(Framer::Json, json.clone(), json).await;

        let yaml = Arc::new(json::Serializer::yaml(scheme.clone(), scheme.clone()));
        round_trip(Framer::Yaml, yaml.clone(), yaml).await;

        let binary = Arc::new(protobuf::Serializer::new(scheme.clone(), scheme));
        round_trip(Framer::LengthDelimited, binary.clone(), binary).await;
    }

    #[tokio::test]
    async fn bad_frames_are_reported_and_skipped() {
        let scheme = Arc::new(testing::scheme());
        let json: Arc<json::Serializer> = Arc::new(json::Serializer::json(scheme.clone(), scheme));
        let data = br#"{"type":"ADDED","object":null}{"type":"ADDED","object":{"apiVersion":"toys/v1","kind":"Gadget","size":3}}"#;
        let items = watch_events(&data[..], Framer::Json, json.clone(), json)
            .collect::<Vec<_>>()
            .await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_err());
        let event = items[1].as_ref().unwrap();
        assert_eq!(event.object.downcast_ref::<Gadget>().unwrap().size, 3);
    }
}
