use std::sync::Arc;

use apimachinery::{
    admission::{
        builtin, config, read_admission_configuration, AdmissionError, Attributes, CapabilityInitializer,
        Interface, MutationInterface, ObjectInterfaces, Operation, Plugins, TracingDecorator, ValidationInterface,
    },
    core::{Unstructured, Value},
    GroupVersionKind, Object, Scheme,
};
use async_trait::async_trait;

/// Appends its configured label to `spec.items`
struct Append(String);

impl Interface for Append {
    fn handles(&self, operation: Operation) -> bool {
        matches!(operation, Operation::Create | Operation::Update)
    }

    fn as_mutating(&self) -> Option<&dyn MutationInterface> {
        Some(self)
    }
}

#[async_trait]
impl MutationInterface for Append {
    async fn admit(&self, attributes: &mut Attributes, _: &ObjectInterfaces) -> apimachinery::admission::Result<()> {
        let object = attributes
            .object_as_mut::<Unstructured>()
            .ok_or_else(|| AdmissionError::Internal("expected an unstructured object".into()))?;
        let mut items = match object.remove_nested_field(&["spec", "items"]) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        items.push(Value::from(self.0.as_str()));
        object.set_nested_field(Value::Array(items), &["spec", "items"]);
        Ok(())
    }
}

/// Rejects objects with more than `limit` items
struct Limit(usize);

impl Interface for Limit {
    fn handles(&self, _: Operation) -> bool {
        true
    }

    fn as_validating(&self) -> Option<&dyn ValidationInterface> {
        Some(self)
    }
}

#[async_trait]
impl ValidationInterface for Limit {
    async fn validate(&self, attributes: &Attributes, _: &ObjectInterfaces) -> apimachinery::admission::Result<()> {
        if items(attributes) > self.0 {
            return Err(AdmissionError::forbidden(attributes, format!("more than {} items", self.0)));
        }
        Ok(())
    }
}

fn items(attributes: &Attributes) -> usize {
    match attributes
        .object_as::<Unstructured>()
        .and_then(|o| o.nested_field(&["spec", "items"]))
    {
        Some(Value::Array(items)) => items.len(),
        _ => 0,
    }
}

fn registry() -> Plugins {
    let plugins = Plugins::new();
    builtin::register_all(&plugins);
    plugins.register("First", |_| Ok(Box::new(Append("first".into()))));
    plugins.register("Second", |_| Ok(Box::new(Append("second".into()))));
    plugins.register("Limit", |config| {
        let limit = config
            .map(serde_json::from_slice::<serde_json::Value>)
            .transpose()
            .map_err(|e| AdmissionError::Internal(e.to_string()))?
            .and_then(|v| v["limit"].as_u64())
            .ok_or_else(|| AdmissionError::Internal("limit is required".into()))?;
        Ok(Box::new(Limit(limit as usize)))
    });
    plugins
}

fn basket(initial: usize) -> Attributes {
    let mut object = Unstructured::with_kind(&GroupVersionKind::gvk("example.com", "v1", "Basket"));
    object.set_nested_field(Value::Array(vec![Value::from("seed"); initial]), &["spec", "items"]);
    Attributes::new(object.group_version_kind(), Operation::Create)
        .with_name("basket")
        .with_object(Box::new(object))
}

#[tokio::test]
async fn configured_chain_mutates_then_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("admission.yaml");
    std::fs::write(
        &path,
        r#"
apiVersion: apiserver.config.k8s.io/v1
kind: AdmissionConfiguration
plugins:
- name: Limit
  configuration:
    limit: 2
"#,
    )
    .unwrap();

    let names = ["First", "Limit", "Second"].map(String::from).to_vec();
    let configs = read_admission_configuration(&names, Some(&path), &config::codecs()).unwrap();

    let scheme = Arc::new(Scheme::with_name("admission-e2e"));
    let initializer = CapabilityInitializer::default();
    let chain = registry()
        .new_from_plugins(&names, &configs, &initializer, Some(&TracingDecorator))
        .unwrap();
    let objects = ObjectInterfaces::from_scheme(scheme);

    let mut rejected = basket(1);
    chain.admit(&mut rejected, &objects).await.unwrap();
    assert_eq!(items(&rejected), 3);
    let err = chain.validate(&rejected, &objects).await.unwrap_err();
    assert!(err.is_forbidden());
    assert_eq!(err.to_status().code, 403);

    let mut accepted = basket(0);
    chain.admit(&mut accepted, &objects).await.unwrap();
    let object = accepted.object_as::<Unstructured>().unwrap();
    assert_eq!(
        object.nested_field(&["spec", "items"]),
        Some(&Value::Array(vec![Value::from("first"), Value::from("second")]))
    );
    chain.validate(&accepted, &objects).await.unwrap();
}

#[tokio::test]
async fn missing_configuration_fails_initialization() {
    let names = vec!["Limit".to_string()];
    let configs = read_admission_configuration(&names, None, &config::codecs()).unwrap();
    let err = registry()
        .new_from_plugins(&names, &configs, &CapabilityInitializer::default(), None)
        .unwrap_err();
    assert!(matches!(err, AdmissionError::Initialization { ref name, .. } if name == "Limit"));

    let err = registry()
        .new_from_plugins(&["Nope".to_string()], &configs, &CapabilityInitializer::default(), None)
        .unwrap_err();
    assert!(matches!(err, AdmissionError::UnknownPlugin(_)));
}

#[tokio::test]
async fn always_deny_rejects_everything() {
    let names = vec![builtin::ALWAYS_DENY.to_string()];
    let chain = registry()
        .new_from_plugins(
            &names,
            &apimachinery::admission::PluginConfigs::default(),
            &CapabilityInitializer::default(),
            None,
        )
        .unwrap();
    let objects = ObjectInterfaces::from_scheme(Arc::new(Scheme::new()));
    let mut attributes = basket(0);
    let err = chain.admit(&mut attributes, &objects).await.unwrap_err();
    assert!(err.is_forbidden());
    assert!(err.to_string().contains("is forbidden"));
}
