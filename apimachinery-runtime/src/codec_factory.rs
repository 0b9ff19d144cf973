//! Building serializers and version-aware codecs for a scheme.
use std::sync::Arc;

use apimachinery_core::{
    gvk::{GroupVersions, InternalGroupVersioner},
    GroupVersion, GroupVersioner,
};

use crate::{
    error::{Error, Result},
    scheme::Scheme,
    serializer::{
        framer::Framer,
        json::{self, SerializerOptions},
        negotiate_media_type, protobuf,
        recognizer::RecognizerDecoder,
        serializer_info_for_media_type,
        versioning::VersioningCodec,
        Codec, Decoder, Encoder, NegotiatedSerializer, RecognizingDecoder, SerializerInfo, StreamSerializerInfo,
        WithVersionEncoder, WithoutVersionDecoder, CONTENT_TYPE_JSON, CONTENT_TYPE_PROTOBUF, CONTENT_TYPE_YAML,
    },
};

/// Options of a [`CodecFactory`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecFactoryOptions {
    /// Decode strictly by default
    pub strict: bool,
    /// Offer indenting serializers for text formats
    pub pretty: bool,
}

impl Default for CodecFactoryOptions {
    fn default() -> Self {
        Self {
            strict: false,
            pretty: true,
        }
    }
}

/// A function adjusting [`CodecFactoryOptions`]
pub type CodecFactoryOptionsMutator = fn(&mut CodecFactoryOptions);

/// Offer pretty printing serializers
pub fn enable_pretty(options: &mut CodecFactoryOptions) {
    options.pretty = true;
}

/// Do not offer pretty printing serializers
pub fn disable_pretty(options: &mut CodecFactoryOptions) {
    options.pretty = false;
}

/// Report duplicate and unknown fields from the default serializers
pub fn enable_strict(options: &mut CodecFactoryOptions) {
    options.strict = true;
}

/// Ignore duplicate and unknown fields in the default serializers
pub fn disable_strict(options: &mut CodecFactoryOptions) {
    options.strict = false;
}

/// Serializers for every supported media type, bound to one scheme.
#[derive(Debug, Clone)]
pub struct CodecFactory {
    scheme: Arc<Scheme>,
    options: CodecFactoryOptions,
    accepts: Vec<SerializerInfo>,
    universal: Arc<RecognizerDecoder>,
    legacy: Codec,
}

fn serializers_for_scheme(
    scheme: &Arc<Scheme>,
    options: CodecFactoryOptions,
) -> (Vec<SerializerInfo>, Vec<Arc<dyn RecognizingDecoder>>, Codec) {
    let text = |yaml: bool, pretty: bool, strict: bool| {
        Arc::new(json::Serializer::new(scheme.clone(), scheme.clone(), SerializerOptions {
            yaml,
            pretty,
            strict,
        }))
    };

    let json = text(false, false, options.strict);
    let json_info = SerializerInfo {
        media_type: CONTENT_TYPE_JSON,
        media_type_type: "application",
        media_type_sub_type: "json",
        encodes_as_text: true,
        serializer: Codec::new(json.clone(), json.clone()),
        pretty_serializer: options.pretty.then(|| {
            let pretty = text(false, true, options.strict);
            Codec::new(pretty.clone(), pretty)
        }),
        strict_serializer: Some({
            let strict = text(false, false, true);
            Codec::new(strict.clone(), strict)
        }),
        stream_serializer: Some(StreamSerializerInfo {
            encodes_as_text: true,
            serializer: Codec::new(json.clone(), json.clone()),
            framer: Framer::Json,
        }),
    };

    let yaml = text(true, false, options.strict);
    let yaml_info = SerializerInfo {
        media_type: CONTENT_TYPE_YAML,
        media_type_type: "application",
        media_type_sub_type: "yaml",
        encodes_as_text: true,
        serializer: Codec::new(yaml.clone(), yaml.clone()),
        pretty_serializer: None,
        strict_serializer: Some({
            let strict = text(true, false, true);
            Codec::new(strict.clone(), strict)
        }),
        stream_serializer: Some(StreamSerializerInfo {
            encodes_as_text: true,
            serializer: Codec::new(yaml.clone(), yaml.clone()),
            framer: Framer::Yaml,
        }),
    };

    // the binary format has no strict variant
    let binary = Arc::new(protobuf::Serializer::new(scheme.clone(), scheme.clone()));
    let binary_info = SerializerInfo {
        media_type: CONTENT_TYPE_PROTOBUF,
        media_type_type: "application",
        media_type_sub_type: "vnd.kubernetes.protobuf",
        encodes_as_text: false,
        serializer: Codec::new(binary.clone(), binary.clone()),
        pretty_serializer: None,
        strict_serializer: Some(Codec::new(binary.clone(), binary.clone())),
        stream_serializer: Some(StreamSerializerInfo {
            encodes_as_text: false,
            serializer: Codec::new(binary.clone(), binary.clone()),
            framer: Framer::LengthDelimited,
        }),
    };

    let decoders: Vec<Arc<dyn RecognizingDecoder>> = vec![json.clone(), yaml, binary];
    let legacy = Codec::new(json.clone(), json);
    (vec![json_info, yaml_info, binary_info], decoders, legacy)
}

impl CodecFactory {
    /// A factory for `scheme` with the default options adjusted by `mutators`
    pub fn new(scheme: Arc<Scheme>, mutators: &[CodecFactoryOptionsMutator]) -> Self {
        let mut options = CodecFactoryOptions::default();
        for mutate in mutators {
            mutate(&mut options);
        }
        Self::with_options(scheme, options)
    }

    /// A factory for `scheme` with explicit options
    pub fn with_options(scheme: Arc<Scheme>, options: CodecFactoryOptions) -> Self {
        let (accepts, decoders, legacy) = serializers_for_scheme(&scheme, options);
        tracing::debug!(scheme = scheme.name(), ?options, "built codec factory");
        Self {
            scheme,
            options,
            accepts,
            universal: Arc::new(RecognizerDecoder::new(decoders)),
            legacy,
        }
    }

    /// The options this factory was built with
    pub fn options(&self) -> CodecFactoryOptions {
        self.options
    }

    /// The scheme behind every codec of this factory
    pub fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    /// Every supported media type, JSON first
    pub fn supported_media_types(&self) -> &[SerializerInfo] {
        &self.accepts
    }

    /// The serializer for exactly `media_type`; parameters are ignored
    pub fn serializer_for_media_type(&self, media_type: &str) -> Result<&SerializerInfo> {
        serializer_info_for_media_type(&self.accepts, media_type)
            .ok_or_else(|| Error::UnsupportedMediaType(media_type.to_string()))
    }

    /// The serializer best matching an `Accept` header
    pub fn negotiate(&self, accept: &str) -> Result<&SerializerInfo> {
        negotiate_media_type(accept, &self.accepts).ok_or_else(|| Error::UnsupportedMediaType(accept.to_string()))
    }

    /// A decoder for any supported format that performs no conversion or defaulting
    pub fn universal_deserializer(&self) -> Arc<dyn Decoder> {
        self.universal.clone()
    }

    /// A decoder for any supported format that converts to `versions`, or to
    /// the internal version when none are given, and applies defaults
    pub fn universal_decoder(&self, versions: &[GroupVersion]) -> Arc<dyn Decoder> {
        let target: Arc<dyn GroupVersioner> = if versions.is_empty() {
            Arc::new(InternalGroupVersioner)
        } else {
            Arc::new(GroupVersions(versions.to_vec()))
        };
        Arc::new(self.versioning(self.legacy.encoder.clone(), self.universal.clone(), None, Some(target)))
    }

    /// Compose an encoder and a decoder with explicit conversion targets
    pub fn codec_for_versions(
        &self,
        encoder: Arc<dyn Encoder>,
        decoder: Arc<dyn Decoder>,
        encode: Option<Arc<dyn GroupVersioner>>,
        decode: Option<Arc<dyn GroupVersioner>>,
    ) -> Codec {
        Codec::from_serializer(self.versioning(encoder, decoder, encode, decode))
    }

    /// A codec writing JSON in `versions` and reading any format into the internal version
    pub fn legacy_codec(&self, versions: &[GroupVersion]) -> Codec {
        self.codec_for_versions(
            self.legacy.encoder.clone(),
            self.universal.clone(),
            Some(Arc::new(GroupVersions(versions.to_vec()))),
            Some(Arc::new(InternalGroupVersioner)),
        )
    }

    /// A view of this factory whose codecs never convert
    pub fn without_conversion(&self) -> WithoutConversionCodecFactory {
        WithoutConversionCodecFactory { factory: self.clone() }
    }

    fn versioning(
        &self,
        encoder: Arc<dyn Encoder>,
        decoder: Arc<dyn Decoder>,
        encode: Option<Arc<dyn GroupVersioner>>,
        decode: Option<Arc<dyn GroupVersioner>>,
    ) -> VersioningCodec {
        VersioningCodec::new(encoder, decoder, self.scheme.clone(), encode, decode)
    }
}

impl NegotiatedSerializer for CodecFactory {
    fn supported_media_types(&self) -> &[SerializerInfo] {
        &self.accepts
    }

    fn encoder_for_version(&self, encoder: Arc<dyn Encoder>, gv: Arc<dyn GroupVersioner>) -> Arc<dyn Encoder> {
        Arc::new(self.versioning(encoder, self.universal.clone(), Some(gv), None))
    }

    fn decoder_to_version(&self, decoder: Arc<dyn Decoder>, gv: Arc<dyn GroupVersioner>) -> Arc<dyn Decoder> {
        Arc::new(self.versioning(self.legacy.encoder.clone(), decoder, None, Some(gv)))
    }
}

/// Serializers that stamp kinds on the way out and clear them on the way in,
/// without converting between versions.
#[derive(Debug, Clone)]
pub struct WithoutConversionCodecFactory {
    factory: CodecFactory,
}

impl NegotiatedSerializer for WithoutConversionCodecFactory {
    fn supported_media_types(&self) -> &[SerializerInfo] {
        self.factory.supported_media_types()
    }

    fn encoder_for_version(&self, encoder: Arc<dyn Encoder>, gv: Arc<dyn GroupVersioner>) -> Arc<dyn Encoder> {
        Arc::new(WithVersionEncoder {
            version: Some(gv),
            encoder,
            typer: self.factory.scheme.clone(),
        })
    }

    fn decoder_to_version(&self, decoder: Arc<dyn Decoder>, _gv: Arc<dyn GroupVersioner>) -> Arc<dyn Decoder> {
        Arc::new(WithoutVersionDecoder { decoder })
    }
}
