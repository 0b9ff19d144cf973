//! Encoders, decoders and the wire formats built on them.
//!
//! Every format implements [`Encoder`] and [`Decoder`]. A decoder that can
//! sniff its format from the leading bytes also implements
//! [`RecognizingDecoder`], which lets the [`recognizer`] pick a format for
//! arbitrary payloads.
use std::{fmt, io, sync::Arc};

use apimachinery_core::{GroupVersionKind, GroupVersioner, Object};

use crate::{
    error::{Error, Result, StrictDecodingError},
    scheme::{ObjectCreater, ObjectTyper},
};

pub mod framer;
pub mod json;
pub mod protobuf;
pub mod recognizer;
pub mod streaming;
pub mod versioning;

/// Media type of the JSON format
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Media type of the YAML format
pub const CONTENT_TYPE_YAML: &str = "application/yaml";
/// Media type of the binary format
pub const CONTENT_TYPE_PROTOBUF: &str = "application/vnd.kubernetes.protobuf";

/// Supplies scratch buffers for encoders.
pub trait MemoryAllocator: Send {
    /// An empty buffer with room for at least `n` bytes
    fn allocate(&mut self, n: usize) -> &mut Vec<u8>;
}

/// Hands out a fresh buffer on every call.
#[derive(Debug, Default)]
pub struct Allocator {
    buf: Vec<u8>,
}

impl MemoryAllocator for Allocator {
    fn allocate(&mut self, n: usize) -> &mut Vec<u8> {
        self.buf = Vec::with_capacity(n);
        &mut self.buf
    }
}

/// Reuses one buffer, growing it when a larger one is requested.
#[derive(Debug, Default)]
pub struct SimpleAllocator {
    buf: Vec<u8>,
}

impl MemoryAllocator for SimpleAllocator {
    fn allocate(&mut self, n: usize) -> &mut Vec<u8> {
        self.buf.clear();
        self.buf.reserve(n);
        &mut self.buf
    }
}

/// Writes objects in some wire format.
pub trait Encoder: Send + Sync {
    /// Write `obj` to `w`
    fn encode(&self, obj: &dyn Object, w: &mut dyn io::Write) -> Result<()>;

    /// Write `obj` to `w`, taking scratch space from `alloc`
    fn encode_with_allocator(
        &self,
        obj: &dyn Object,
        w: &mut dyn io::Write,
        _alloc: &mut dyn MemoryAllocator,
    ) -> Result<()> {
        self.encode(obj, w)
    }

    /// A stable name for this encoder and its options
    fn identifier(&self) -> String;
}

/// The result of a successful decode.
#[derive(Debug)]
pub struct Decoded {
    /// The decoded object
    pub object: Box<dyn Object>,
    /// The kind the payload was decoded as
    pub gvk: GroupVersionKind,
    /// Strict mode diagnostics; the object is still usable when present
    pub strict_errors: Vec<String>,
}

impl Decoded {
    /// A decode with no strict diagnostics
    pub fn new(object: Box<dyn Object>, gvk: GroupVersionKind) -> Self {
        Self {
            object,
            gvk,
            strict_errors: Vec::new(),
        }
    }

    /// The strict diagnostics as an error, if there are any
    pub fn strict_error(&self) -> Option<StrictDecodingError> {
        (!self.strict_errors.is_empty()).then(|| StrictDecodingError::new(self.strict_errors.clone()))
    }

    /// Fail on strict diagnostics, otherwise yield the object and its kind
    pub fn into_result(self) -> Result<(Box<dyn Object>, GroupVersionKind)> {
        if self.strict_errors.is_empty() {
            Ok((self.object, self.gvk))
        } else {
            Err(StrictDecodingError::new(self.strict_errors).into())
        }
    }

    /// Downcast the object, failing with a conversion error on mismatch
    pub fn into_typed<T: Object>(self) -> Result<T> {
        self.object
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|obj| Error::conversion(format!("decoded {} is not a {}", obj.layout(), std::any::type_name::<T>())))
    }
}

/// Reads objects from some wire format.
pub trait Decoder: Send + Sync {
    /// Decode `data`.
    ///
    /// `defaults` fills in whatever parts of the kind the payload leaves out.
    /// When `into` is supplied and matches the decoded kind it is filled and
    /// returned, otherwise a new object is created.
    fn decode(
        &self,
        data: &[u8],
        defaults: Option<&GroupVersionKind>,
        into: Option<Box<dyn Object>>,
    ) -> Result<Decoded>;
}

/// The answer of [`RecognizingDecoder::recognizes_data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recognized {
    /// The payload is in this format
    Yes,
    /// The payload is not in this format
    No,
    /// The format cannot tell from a prefix
    Unknown,
}

/// A decoder that can tell whether a payload is in its format.
pub trait RecognizingDecoder: Decoder {
    /// Inspect the leading bytes of `data`
    fn recognizes_data(&self, data: &[u8]) -> Result<Recognized>;
}

/// An encoder and a decoder for the same format.
#[derive(Clone)]
pub struct Codec {
    /// Writes objects
    pub encoder: Arc<dyn Encoder>,
    /// Reads objects
    pub decoder: Arc<dyn Decoder>,
}

impl Codec {
    /// Pair an encoder and a decoder
    pub fn new(encoder: Arc<dyn Encoder>, decoder: Arc<dyn Decoder>) -> Self {
        Self { encoder, decoder }
    }

    /// Use one value as both halves
    pub fn from_serializer<S: Encoder + Decoder + 'static>(serializer: S) -> Self {
        let serializer = Arc::new(serializer);
        Self {
            encoder: serializer.clone(),
            decoder: serializer,
        }
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("encoder", &self.encoder.identifier())
            .finish_non_exhaustive()
    }
}

impl Encoder for Codec {
    fn encode(&self, obj: &dyn Object, w: &mut dyn io::Write) -> Result<()> {
        self.encoder.encode(obj, w)
    }

    fn encode_with_allocator(
        &self,
        obj: &dyn Object,
        w: &mut dyn io::Write,
        alloc: &mut dyn MemoryAllocator,
    ) -> Result<()> {
        self.encoder.encode_with_allocator(obj, w, alloc)
    }

    fn identifier(&self) -> String {
        self.encoder.identifier()
    }
}

impl Decoder for Codec {
    fn decode(
        &self,
        data: &[u8],
        defaults: Option<&GroupVersionKind>,
        into: Option<Box<dyn Object>>,
    ) -> Result<Decoded> {
        self.decoder.decode(data, defaults, into)
    }
}

/// How a format is framed when several objects share one stream.
#[derive(Debug, Clone)]
pub struct StreamSerializerInfo {
    /// Whether the framed output is text
    pub encodes_as_text: bool,
    /// Serializer for individual frames
    pub serializer: Codec,
    /// Splits and joins frames
    pub framer: framer::Framer,
}

/// Everything known about one supported media type.
#[derive(Debug, Clone)]
pub struct SerializerInfo {
    /// The full media type, e.g. `application/json`
    pub media_type: &'static str,
    /// The part before the slash
    pub media_type_type: &'static str,
    /// The part after the slash
    pub media_type_sub_type: &'static str,
    /// Whether the encoding is text
    pub encodes_as_text: bool,
    /// The default serializer
    pub serializer: Codec,
    /// An indenting serializer, when pretty printing is enabled
    pub pretty_serializer: Option<Codec>,
    /// A serializer that always decodes strictly
    pub strict_serializer: Option<Codec>,
    /// Stream framing, for formats that support watching
    pub stream_serializer: Option<StreamSerializerInfo>,
}

/// Look up the serializer registered for a media type
pub fn serializer_info_for_media_type<'a>(
    infos: &'a [SerializerInfo],
    media_type: &str,
) -> Option<&'a SerializerInfo> {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    infos.iter().find(|info| info.media_type.eq_ignore_ascii_case(essence))
}

/// Pick the serializer that best satisfies an `Accept` header.
///
/// Entries are tried by descending `q` value, then in header order; `*/*` and
/// `type/*` wildcards match the first compatible serializer. An empty header
/// accepts anything.
pub fn negotiate_media_type<'a>(accept: &str, infos: &'a [SerializerInfo]) -> Option<&'a SerializerInfo> {
    if accept.trim().is_empty() {
        return infos.first();
    }
    let mut ranges = accept
        .split(',')
        .enumerate()
        .filter_map(|(i, range)| {
            let mut parts = range.split(';');
            let media = parts.next()?.trim().to_ascii_lowercase();
            let q = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            (q > 0.0 && !media.is_empty()).then_some((media, q, i))
        })
        .collect::<Vec<_>>();
    ranges.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
    ranges.iter().find_map(|(media, _, _)| {
        let (ty, sub) = media.split_once('/')?;
        infos.iter().find(|info| {
            (ty == "*" || ty == info.media_type_type) && (sub == "*" || sub == info.media_type_sub_type)
        })
    })
}

/// Chooses encoders and decoders per media type and wraps them for a version.
pub trait NegotiatedSerializer: Send + Sync {
    /// Every supported media type
    fn supported_media_types(&self) -> &[SerializerInfo];

    /// An encoder that writes objects as the version `gv` selects
    fn encoder_for_version(&self, encoder: Arc<dyn Encoder>, gv: Arc<dyn GroupVersioner>) -> Arc<dyn Encoder>;

    /// A decoder that reads objects into the version `gv` selects
    fn decoder_to_version(&self, decoder: Arc<dyn Decoder>, gv: Arc<dyn GroupVersioner>) -> Arc<dyn Decoder>;
}

/// Fill in the parts of `actual` the payload left out from `defaults`.
///
/// The kind is taken when missing; the group and version are taken together
/// when both are missing, and the version alone when the groups agree.
pub fn gvk_with_defaults(mut actual: GroupVersionKind, defaults: &GroupVersionKind) -> GroupVersionKind {
    if actual.kind.is_empty() {
        actual.kind = defaults.kind.clone();
    }
    if actual.version.is_empty() && actual.group.is_empty() {
        actual.group = defaults.group.clone();
        actual.version = defaults.version.clone();
    }
    if actual.version.is_empty() && actual.group == defaults.group {
        actual.version = defaults.version.clone();
    }
    actual
}

/// Return `obj` when it is already one of `gvk`'s layouts, otherwise create a new object.
pub fn use_or_create_object(
    typer: &dyn ObjectTyper,
    creater: &dyn ObjectCreater,
    gvk: &GroupVersionKind,
    obj: Option<Box<dyn Object>>,
) -> Result<Box<dyn Object>> {
    if let Some(obj) = obj {
        let (kinds, _) = typer.object_kinds(obj.as_ref())?;
        if kinds.contains(gvk) {
            return Ok(obj);
        }
    }
    creater.new_object(gvk)
}

/// Encode `obj` into a fresh buffer
pub fn encode(encoder: &dyn Encoder, obj: &dyn Object) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encoder.encode(obj, &mut buf)?;
    Ok(buf)
}

/// Decode `data` with no defaults and no target, failing on strict diagnostics
pub fn decode(decoder: &dyn Decoder, data: &[u8]) -> Result<Box<dyn Object>> {
    decoder.decode(data, None, None)?.into_result().map(|(obj, _)| obj)
}

/// Decode `data` into a `T`, failing on strict diagnostics or a different layout
pub fn decode_into<T: Object + Default>(decoder: &dyn Decoder, data: &[u8]) -> Result<T> {
    let decoded = decoder.decode(data, None, Some(Box::new(T::default())))?;
    if let Some(err) = decoded.strict_error() {
        return Err(err.into());
    }
    decoded.into_typed()
}

/// Stamps the preferred kind on objects while they are written.
///
/// Objects whose layout is not registered are written untouched.
pub struct WithVersionEncoder {
    /// Picks the kind to stamp
    pub version: Option<Arc<dyn GroupVersioner>>,
    /// Writes the stamped object
    pub encoder: Arc<dyn Encoder>,
    /// Reports an object's kinds
    pub typer: Arc<dyn ObjectTyper>,
}

impl Encoder for WithVersionEncoder {
    fn encode(&self, obj: &dyn Object, w: &mut dyn io::Write) -> Result<()> {
        let kinds = match self.typer.object_kinds(obj) {
            Ok((kinds, _)) => kinds,
            Err(e) if e.is_not_registered() => return self.encoder.encode(obj, w),
            Err(e) => return Err(e),
        };
        let mut gvk = kinds.first().cloned().unwrap_or_default();
        if let Some(preferred) = self
            .version
            .as_ref()
            .and_then(|v| v.kind_for_group_version_kinds(&kinds))
        {
            gvk = preferred;
        }
        if gvk == obj.group_version_kind() {
            return self.encoder.encode(obj, w);
        }
        let mut stamped = obj.deep_copy_object();
        stamped.set_group_version_kind(&gvk);
        self.encoder.encode(stamped.as_ref(), w)
    }

    fn identifier(&self) -> String {
        self.encoder.identifier()
    }
}

/// Clears the kind of every decoded object.
pub struct WithoutVersionDecoder {
    /// The underlying decoder
    pub decoder: Arc<dyn Decoder>,
}

impl Decoder for WithoutVersionDecoder {
    fn decode(
        &self,
        data: &[u8],
        defaults: Option<&GroupVersionKind>,
        into: Option<Box<dyn Object>>,
    ) -> Result<Decoded> {
        let mut decoded = self.decoder.decode(data, defaults, into)?;
        decoded.object.set_group_version_kind(&GroupVersionKind::default());
        Ok(decoded)
    }
}
