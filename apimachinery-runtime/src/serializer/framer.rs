//! Delimiting objects on a byte stream.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::IgnoredAny;
use tokio_util::codec::{self, Decoder as _, Encoder as _, LengthDelimitedCodec};

use crate::error::{Error, Result};

/// Largest frame accepted by any framer
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

const YAML_SEPARATOR: &[u8] = b"---";

/// How consecutive objects are separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framer {
    /// JSON objects are self delimiting
    Json,
    /// YAML documents are split on `---` lines
    Yaml,
    /// Every frame is prefixed by its length as a 4 byte big-endian integer
    LengthDelimited,
}

impl Framer {
    /// A codec reading and writing frames in this style
    pub fn codec(self) -> FrameCodec {
        FrameCodec {
            framer: self,
            length: LengthDelimitedCodec::builder()
                .big_endian()
                .length_field_length(4)
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
        }
    }

    /// Split a complete buffer into frames
    pub fn split(self, data: &[u8]) -> Result<Vec<Bytes>> {
        let mut codec = self.codec();
        let mut buf = BytesMut::from(data);
        let mut frames = Vec::new();
        while let Some(frame) = codec::Decoder::decode_eof(&mut codec, &mut buf)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Join frames into one buffer
    pub fn join(self, frames: impl IntoIterator<Item = Bytes>) -> Result<Bytes> {
        let mut codec = self.codec();
        let mut buf = BytesMut::new();
        for frame in frames {
            codec::Encoder::encode(&mut codec, frame, &mut buf)?;
        }
        Ok(buf.freeze())
    }
}

/// Frame codec for a [`Framer`], usable with `FramedRead` and `FramedWrite`.
#[derive(Debug)]
pub struct FrameCodec {
    framer: Framer,
    length: LengthDelimitedCodec,
}

impl FrameCodec {
    /// The framing style
    pub fn framer(&self) -> Framer {
        self.framer
    }
}

fn is_blank(data: &[u8]) -> bool {
    data.iter().all(u8::is_ascii_whitespace)
}

/// A line is a separator when it starts with `---` followed by nothing but
/// whitespace or a comment.
fn is_yaml_separator(line: &[u8]) -> bool {
    let Some(rest) = line.strip_prefix(YAML_SEPARATOR) else {
        return false;
    };
    let rest = String::from_utf8_lossy(rest);
    let rest = rest.trim();
    rest.is_empty() || rest.starts_with('#')
}

fn decode_json(buf: &mut BytesMut) -> Result<Option<Bytes>> {
    let end = {
        let mut stream = serde_json::Deserializer::from_slice(&buf[..]).into_iter::<IgnoredAny>();
        match stream.next() {
            None => None,
            Some(Err(e)) if e.is_eof() => return Ok(None),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(_)) => Some(stream.byte_offset()),
        }
    };
    let Some(end) = end else {
        buf.clear();
        return Ok(None);
    };
    let start = buf[..end].iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(end);
    buf.advance(start);
    Ok(Some(buf.split_to(end - start).freeze()))
}

fn decode_yaml(buf: &mut BytesMut) -> Option<Bytes> {
    let mut line_start = 0;
    while let Some(offset) = buf[line_start..].iter().position(|b| *b == b'\n') {
        let line_end = line_start + offset + 1;
        if !is_yaml_separator(&buf[line_start..line_end]) {
            line_start = line_end;
            continue;
        }
        let document = buf.split_to(line_start).freeze();
        buf.advance(line_end - line_start);
        if !is_blank(&document) {
            return Some(document);
        }
        line_start = 0;
    }
    None
}

impl codec::Decoder for FrameCodec {
    type Error = Error;
    type Item = Bytes;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.framer {
            Framer::Json => {
                if buf.len() > MAX_FRAME_LENGTH {
                    return Err(Error::BadRequest(format!(
                        "object exceeds the maximum frame length of {MAX_FRAME_LENGTH} bytes"
                    )));
                }
                decode_json(buf)
            }
            Framer::Yaml => Ok(decode_yaml(buf)),
            Framer::LengthDelimited => Ok(self.length.decode(buf)?.map(BytesMut::freeze)),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        match self.framer {
            Framer::Yaml if !is_blank(buf) => {
                let mut document = buf.split();
                if is_yaml_separator(&document) {
                    document.clear();
                    return Ok(None);
                }
                Ok(Some(document.freeze()))
            }
            _ if is_blank(buf) => {
                buf.clear();
                Ok(None)
            }
            _ => Err(Error::BadRequest(format!(
                "stream ended inside a frame ({} bytes remaining)",
                buf.len()
            ))),
        }
    }
}

impl codec::Encoder<Bytes> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Bytes, buf: &mut BytesMut) -> Result<()> {
        match self.framer {
            Framer::Json => buf.put(frame),
            Framer::Yaml => {
                buf.put_slice(b"---\n");
                let needs_newline = !frame.ends_with(b"\n");
                buf.put(frame);
                if needs_newline {
                    buf.put_u8(b'\n');
                }
            }
            Framer::LengthDelimited => self.length.encode(frame, buf)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::codec::Decoder;

    #[test]
    fn json_objects_split_where_they_end() {
        let frames = Framer::Json
            .split(b"{\"a\":1}\n  {\"b\":\"}{\"}{\"c\":[1,2]}\n")
            .unwrap();
        assert_eq!(frames, [
            Bytes::from_static(b"{\"a\":1}"),
            Bytes::from_static(b"{\"b\":\"}{\"}"),
            Bytes::from_static(b"{\"c\":[1,2]}"),
        ]);
    }

    #[test]
    fn partial_json_waits_for_more() {
        let mut codec = Framer::Json.codec();
        let mut buf = BytesMut::from(&b"{\"a\":"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"1}{");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Bytes::from_static(b"{\"a\":1}")));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(codec.decode_eof(&mut buf).is_err());
        assert!(codec.decode(&mut BytesMut::from(&b"{]"[..])).is_err());
    }

    #[test]
    fn yaml_documents_split_on_separators() {
        let data = b"---\na: 1\n--- # second\nb: 2\n---\n\n---\nc: 3\n";
        let frames = Framer::Yaml.split(data).unwrap();
        assert_eq!(frames, [
            Bytes::from_static(b"a: 1\n"),
            Bytes::from_static(b"b: 2\n"),
            Bytes::from_static(b"c: 3\n"),
        ]);
        // a line that merely starts with dashes is content
        let frames = Framer::Yaml.split(b"a: |\n  ---x\n").unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn framers_are_symmetric() {
        let frames = vec![Bytes::from_static(b"one: 1\n"), Bytes::from_static(b"two: 2")];
        let joined = Framer::Yaml.join(frames.clone()).unwrap();
        assert_eq!(joined.as_ref(), b"---\none: 1\n---\ntwo: 2\n");
        assert_eq!(Framer::Yaml.split(&joined).unwrap(), [
            Bytes::from_static(b"one: 1\n"),
            Bytes::from_static(b"two: 2\n"),
        ]);

        let frames = vec![Bytes::from_static(b"\x00\x01"), Bytes::from_static(b"abc")];
        let joined = Framer::LengthDelimited.join(frames.clone()).unwrap();
        assert_eq!(&joined[..6], b"\x00\x00\x00\x02\x00\x01");
        assert_eq!(Framer::LengthDelimited.split(&joined).unwrap(), frames);
        assert!(Framer::LengthDelimited.split(&joined[..joined.len() - 1]).is_err());
    }
}
