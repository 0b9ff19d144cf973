use apimachinery::core::{
    reflect::{from_value, from_value_strict, to_value, Record},
    Equalities, GroupVersionKind, Object, ObjectMeta, Reflect, TypeMeta, Value,
};
use assert_json_diff::assert_json_eq;
use serde_json::json;

#[derive(Reflect, Clone, Debug, Default, PartialEq)]
enum Phase {
    #[default]
    Pending,
    #[reflect(rename = "running")]
    Running,
}

#[derive(Reflect, Clone, Debug, Default, PartialEq)]
struct Port {
    #[reflect(omitempty)]
    name: String,
    container_port: u16,
}

#[derive(Reflect, Clone, Debug, Default)]
#[reflect(object)]
struct Widget {
    #[reflect(inline)]
    types: TypeMeta,
    metadata: ObjectMeta,
    phase: Phase,
    #[reflect(omitempty)]
    ports: Vec<Port>,
    r#type: String,
    #[reflect(skip)]
    cache: Option<u64>,
}

#[derive(Reflect, Clone, Debug, Default, PartialEq)]
struct Wrapper<T> {
    inner: T,
}

#[test]
fn derived_records_use_field_tags() {
    let mut widget = Widget {
        phase: Phase::Running,
        ports: vec![Port {
            name: String::new(),
            container_port: 8080,
        }],
        r#type: "small".into(),
        cache: Some(3),
        ..Widget::default()
    };
    widget.metadata.name = "w".into();
    widget.set_group_version_kind(&GroupVersionKind::gvk("toys", "v1", "Widget"));

    let tree: serde_json::Value = to_value(&widget).unwrap().into();
    assert_json_eq!(
        tree,
        json!({
            "apiVersion": "toys/v1",
            "kind": "Widget",
            "metadata": { "name": "w", "creationTimestamp": null },
            "phase": "running",
            "ports": [{ "containerPort": 8080 }],
            "type": "small",
        })
    );

    let back: Widget = from_value(&Value::from(tree)).unwrap();
    assert_eq!(back.cache, None);
    assert_eq!(back.meta().map(|m| m.name.as_str()), Some("w"));
    assert!(Equalities::new().deep_equal(&back, &widget));
}

#[test]
fn layouts_describe_fields_in_order() {
    let layout = <Widget as Record>::layout();
    assert_eq!(layout.name, "Widget");
    let idents = layout.fields.iter().map(|f| f.ident).collect::<Vec<_>>();
    assert_eq!(idents, ["types", "metadata", "phase", "ports", "r#type"]);
    assert!(layout.fields[0].inline);
    assert!(layout.fields[3].omit_empty);
}

#[test]
fn strict_reads_flag_unknown_variants_and_fields() {
    let tree = Value::from(json!({ "phase": "exploded" }));
    assert!(from_value::<Widget>(&tree).is_err());

    let tree = Value::from(json!({ "kind": "Widget", "ports": [{ "containerPort": 1, "hostPort": 2 }] }));
    let (_, unknown) = from_value_strict::<Widget>(&tree).unwrap();
    assert_eq!(unknown, vec!["ports[0].hostPort".to_string()]);
}

#[test]
fn generic_records() {
    let wrapped = Wrapper {
        inner: Port {
            name: "http".into(),
            container_port: 80,
        },
    };
    let back: Wrapper<Port> = from_value(&to_value(&wrapped).unwrap()).unwrap();
    assert_eq!(back, wrapped);
}
