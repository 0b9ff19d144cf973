//! Picking a format by looking at the payload.
use std::{fmt, sync::Arc};

use apimachinery_core::{util::handle_crash, GroupVersionKind, Object};

use super::{Decoded, Decoder, Recognized, RecognizingDecoder};
use crate::error::{Error, Result};

/// Tries a list of decoders, letting each one claim the payload.
///
/// The first decoder that recognizes the data decodes it. Decoders that cannot
/// tell, or failed to inspect the data, are tried afterwards in order, and the
/// first successful decode wins. A panic in any decoder counts as a failure.
#[derive(Clone)]
pub struct RecognizerDecoder {
    decoders: Vec<Arc<dyn RecognizingDecoder>>,
}

impl fmt::Debug for RecognizerDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecognizerDecoder")
            .field("decoders", &self.decoders.len())
            .finish()
    }
}

fn attempt(
    decoder: &dyn RecognizingDecoder,
    data: &[u8],
    defaults: Option<&GroupVersionKind>,
    into: Option<&dyn Object>,
) -> Result<Decoded> {
    let into = into.map(|obj| obj.deep_copy_object());
    handle_crash("recognizer", || decoder.decode(data, defaults, into)).unwrap_or_else(|msg| Err(Error::Panic(msg)))
}

impl RecognizerDecoder {
    /// Try `decoders` in order
    pub fn new(decoders: Vec<Arc<dyn RecognizingDecoder>>) -> Self {
        Self { decoders }
    }
}

impl Decoder for RecognizerDecoder {
    fn decode(
        &self,
        data: &[u8],
        defaults: Option<&GroupVersionKind>,
        into: Option<Box<dyn Object>>,
    ) -> Result<Decoded> {
        let mut last_err = None;
        let mut skipped = Vec::new();
        for decoder in &self.decoders {
            match decoder.recognizes_data(data) {
                Ok(Recognized::Yes) => return attempt(decoder.as_ref(), data, defaults, into.as_deref()),
                Ok(Recognized::No) => {}
                Ok(Recognized::Unknown) => skipped.push(decoder),
                Err(e) => {
                    last_err = Some(e);
                    skipped.push(decoder);
                }
            }
        }
        for decoder in skipped {
            match attempt(decoder.as_ref(), data, defaults, into.as_deref()) {
                Ok(decoded) => return Ok(decoded),
                Err(e) => {
                    tracing::trace!(error = %e, "decoder could not handle payload");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(Error::NoMatchingFormat))
    }
}

impl RecognizingDecoder for RecognizerDecoder {
    fn recognizes_data(&self, data: &[u8]) -> Result<Recognized> {
        let mut unknown = false;
        let mut last_err = None;
        for decoder in &self.decoders {
            match decoder.recognizes_data(data) {
                Ok(Recognized::Yes) => return Ok(Recognized::Yes),
                Ok(Recognized::No) => {}
                Ok(Recognized::Unknown) => unknown = true,
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) if !unknown => Err(e),
            _ if unknown => Ok(Recognized::Unknown),
            _ => Ok(Recognized::No),
        }
    }
}
