use std::{collections::BTreeMap, sync::Arc};

use apimachinery::{
    core::{gvk::InternalGroupVersioner, Equalities},
    runtime::{
        codec_factory::enable_strict,
        serializer::{decode, encode, json, protobuf, Decoder, CONTENT_TYPE_JSON},
    },
    CodecFactory, Error, GroupVersion, GroupVersionKind, Object, ObjectMeta, Reflect, Scheme, TypeMeta,
};
use assert_json_diff::assert_json_include;
use serde_json::json;

#[derive(Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(object)]
struct Deployment {
    #[reflect(inline)]
    types: TypeMeta,
    metadata: ObjectMeta,
    #[reflect(omitempty)]
    replicas: i32,
    #[reflect(omitempty)]
    selector: BTreeMap<String, String>,
}

#[derive(Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(object)]
struct ConfigMap {
    #[reflect(inline)]
    types: TypeMeta,
    metadata: ObjectMeta,
    #[reflect(omitempty)]
    data: BTreeMap<String, String>,
}

/// The hub form of `Deployment`, with replicas widened and the selector flattened
#[derive(Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(object)]
struct InternalDeployment {
    #[reflect(inline)]
    types: TypeMeta,
    metadata: ObjectMeta,
    replicas: i64,
    selector: Vec<String>,
}

fn apps_v1() -> GroupVersion {
    GroupVersion::gv("apps", "v1")
}

fn scheme() -> Scheme {
    let mut scheme = Scheme::with_name("e2e");
    scheme
        .add_known_type::<Deployment>(&apps_v1())
        .add_known_type_with_name(
            GroupVersion::internal("apps").with_kind("Deployment"),
            apimachinery::runtime::KnownType::of::<InternalDeployment>(),
        )
        .add_known_type::<ConfigMap>(&GroupVersion::gv("", "v1"))
        .add_conversion_func(|src: &Deployment, dst: &mut InternalDeployment, _| {
            dst.metadata = src.metadata.clone();
            dst.replicas = i64::from(src.replicas);
            dst.selector = src.selector.iter().map(|(k, v)| format!("{k}={v}")).collect();
            Ok(())
        })
        .add_conversion_func(|src: &InternalDeployment, dst: &mut Deployment, _| {
            dst.metadata = src.metadata.clone();
            dst.replicas = i32::try_from(src.replicas).map_err(Error::conversion)?;
            dst.selector = src
                .selector
                .iter()
                .map(|pair| {
                    pair.split_once('=')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .ok_or_else(|| Error::conversion(format!("malformed selector {pair:?}")))
                })
                .collect::<Result<_, _>>()?;
            Ok(())
        });
    scheme
}

fn deployment(name: &str, replicas: i32) -> Deployment {
    let mut d = Deployment {
        replicas,
        selector: BTreeMap::from([("app".to_string(), name.to_string())]),
        ..Deployment::default()
    };
    d.metadata.name = name.into();
    d.metadata.namespace = "default".into();
    d.set_group_version_kind(&apps_v1().with_kind("Deployment"));
    d
}

#[test]
fn defaults_fill_in_a_payload_without_type_information() {
    let scheme = Arc::new(scheme());
    let serializer = json::Serializer::json(scheme.clone(), scheme);
    let defaults = GroupVersionKind::gvk("apps", "v1", "Deployment");

    let decoded = serializer
        .decode(
            br#"{"metadata":{"name":"x"}}"#,
            Some(&defaults),
            Some(Box::new(Deployment::default())),
        )
        .unwrap();
    assert_eq!(decoded.gvk, defaults);
    let d = decoded.into_typed::<Deployment>().unwrap();
    assert_eq!(d.metadata.name, "x");
    assert_eq!(d.types.api_version, "apps/v1");
    assert_eq!(d.types.kind, "Deployment");
}

#[test]
fn universal_deserializer_reads_every_format() {
    let scheme = Arc::new(scheme());
    let factory = CodecFactory::new(scheme.clone(), &[]);
    let original = deployment("web", 3);

    let payloads = [
        encode(&json::Serializer::json(scheme.clone(), scheme.clone()), &original).unwrap(),
        encode(&json::Serializer::yaml(scheme.clone(), scheme.clone()), &original).unwrap(),
        encode(&protobuf::Serializer::new(scheme.clone(), scheme.clone()), &original).unwrap(),
    ];
    assert!(payloads[1].starts_with(b"apiVersion: apps/v1"));
    assert!(payloads[2].starts_with(&protobuf::MAGIC));

    let universal = factory.universal_deserializer();
    for payload in &payloads {
        let obj = decode(universal.as_ref(), payload).unwrap();
        assert_eq!(obj.downcast_ref::<Deployment>(), Some(&original));
    }

    let tree: serde_json::Value = serde_json::from_slice(&payloads[0]).unwrap();
    assert_json_include!(
        actual: tree,
        expected: json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "web", "namespace": "default" },
            "replicas": 3,
            "selector": { "app": "web" },
        })
    );
}

#[test]
fn conversion_through_the_internal_version_round_trips() {
    let scheme = scheme();
    let original = deployment("api", 2);

    let internal = scheme.convert_to_version(&original, &InternalGroupVersioner).unwrap();
    let hub = internal.downcast_ref::<InternalDeployment>().unwrap();
    assert_eq!(hub.replicas, 2);
    assert_eq!(hub.selector, ["app=api"]);

    let back = scheme.convert_to_version(internal.as_ref(), &apps_v1()).unwrap();
    assert_eq!(back.group_version_kind(), apps_v1().with_kind("Deployment"));
    assert!(Equalities::new().deep_equal_objects(back.as_ref(), &original));
    assert_eq!(back.downcast_ref::<Deployment>(), Some(&original));
}

#[test]
fn strict_decoding_names_unknown_fields() {
    let factory = CodecFactory::new(Arc::new(scheme()), &[enable_strict]);
    let info = factory.serializer_for_media_type(CONTENT_TYPE_JSON).unwrap();
    let data = br#"{"apiVersion":"v1","kind":"ConfigMap","metadata":{"name":"cm"},"data":{"a":"b"},"bogus":1}"#;

    let decoded = info.serializer.decode(data, None, None).unwrap();
    assert_eq!(decoded.strict_errors, [r#"unknown field "bogus""#]);
    let err = decoded.strict_error().unwrap();
    assert!(err.to_string().contains("bogus"));

    let cm = decoded.into_typed::<ConfigMap>().unwrap();
    assert_eq!(cm.data.get("a").map(String::as_str), Some("b"));

    let err = decode(&info.serializer, data).unwrap_err();
    assert!(err.is_strict_decoding());

    let lenient = CodecFactory::new(Arc::new(scheme()), &[]);
    let info = lenient.serializer_for_media_type(CONTENT_TYPE_JSON).unwrap();
    assert!(decode(&info.serializer, data).is_ok());
}
