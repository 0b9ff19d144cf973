//! The admission configuration file and per-plugin configuration lookup.
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use apimachinery_core::{GroupVersion, ObjectMeta, RawExtension, Reflect, TypeMeta};
use apimachinery_runtime::{
    serializer::{self, CONTENT_TYPE_JSON},
    CodecFactory, KnownType, Scheme,
};
use bytes::Bytes;

use crate::error::{AdmissionError, Result};

/// Group the configuration kinds live in
pub const GROUP: &str = "apiserver.config.k8s.io";

/// Per-plugin configuration for the whole admission chain
#[derive(Reflect, Clone, Debug, Default)]
#[reflect(object, crates(core = "::apimachinery_core"))]
pub struct AdmissionConfiguration {
    /// Type information
    #[reflect(inline)]
    pub types: TypeMeta,
    /// Standard object metadata
    #[reflect(omitempty)]
    pub metadata: ObjectMeta,
    /// Configuration for each plugin, by name
    #[reflect(omitempty)]
    pub plugins: Vec<AdmissionPluginConfiguration>,
}

/// Where one plugin's configuration comes from
#[derive(Reflect, Clone, Debug, Default)]
#[reflect(crates(core = "::apimachinery_core"))]
pub struct AdmissionPluginConfiguration {
    /// Name of the plugin being configured
    pub name: String,
    /// File holding the configuration; relative paths are taken from the
    /// configuration file's directory
    #[reflect(omitempty)]
    pub path: String,
    /// Configuration given inline
    #[reflect(omitempty)]
    pub configuration: RawExtension,
}

/// The scheme configuration files are decoded with
pub fn scheme() -> Scheme {
    let mut scheme = Scheme::with_name("admission-config");
    for version in ["v1", "v1alpha1"] {
        scheme.add_known_type_with_name(
            GroupVersion::gv(GROUP, version).with_kind("AdmissionConfiguration"),
            KnownType::of::<AdmissionConfiguration>(),
        );
    }
    scheme
}

/// Codecs over [`scheme`]
pub fn codecs() -> CodecFactory {
    CodecFactory::new(Arc::new(scheme()), &[])
}

/// Hands each plugin its configuration bytes
pub trait ConfigProvider: Send + Sync {
    /// Configuration for `plugin`; `None` when it has none
    fn config_for(&self, plugin: &str) -> Result<Option<Bytes>>;
}

/// Configuration already loaded into memory
#[derive(Clone, Debug, Default)]
pub struct PluginConfigs {
    configs: BTreeMap<String, Bytes>,
}

impl PluginConfigs {
    /// Set the configuration for `plugin`
    #[must_use]
    pub fn with(mut self, plugin: &str, config: impl Into<Bytes>) -> Self {
        self.configs.insert(plugin.to_string(), config.into());
        self
    }

    /// Plugins that have configuration
    pub fn plugins(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }
}

impl ConfigProvider for PluginConfigs {
    fn config_for(&self, plugin: &str) -> Result<Option<Bytes>> {
        Ok(self.configs.get(plugin).cloned())
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| AdmissionError::Configuration {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load configuration for `plugin_names` from `config_file`
///
/// The file is normally an [`AdmissionConfiguration`] in any supported
/// format. A file of some other kind is handed whole to every named plugin.
/// Without a file no plugin has configuration.
pub fn read_admission_configuration(
    plugin_names: &[String],
    config_file: Option<&Path>,
    factory: &CodecFactory,
) -> Result<PluginConfigs> {
    let Some(config_file) = config_file else {
        return Ok(PluginConfigs::default());
    };
    let data = read(config_file)?;
    let invalid = |reason: String| AdmissionError::Configuration {
        path: config_file.to_path_buf(),
        reason,
    };

    let decoded = match serializer::decode(factory.universal_deserializer().as_ref(), &data) {
        Ok(decoded) => decoded,
        Err(err) if err.is_not_registered() || err.is_missing_kind() || err.is_missing_version() => {
            tracing::debug!(path = ?config_file, "not an admission configuration, sharing it with every plugin");
            let shared = Bytes::from(data);
            let configs = plugin_names
                .iter()
                .map(|name| (name.clone(), shared.clone()))
                .collect();
            return Ok(PluginConfigs { configs });
        }
        Err(err) => return Err(invalid(err.to_string())),
    };
    let config = decoded
        .downcast::<AdmissionConfiguration>()
        .map_err(|other| invalid(format!("unexpected kind {}", other.group_version_kind())))?;

    let base = config_file.parent().unwrap_or_else(|| Path::new(""));
    let json = &factory.serializer_for_media_type(CONTENT_TYPE_JSON)?.serializer;
    let mut configs = BTreeMap::new();
    for plugin in &config.plugins {
        if plugin.name.is_empty() {
            return Err(invalid("plugin entry without a name".into()));
        }
        let bytes = if !plugin.path.is_empty() {
            let path = PathBuf::from(&plugin.path);
            let path = if path.is_relative() { base.join(path) } else { path };
            Bytes::from(read(&path)?)
        } else if !plugin.configuration.raw.is_empty() {
            plugin.configuration.raw.clone()
        } else if let Some(object) = &plugin.configuration.object {
            Bytes::from(serializer::encode(json, object.as_ref())?)
        } else {
            continue;
        };
        configs.insert(plugin.name.clone(), bytes);
    }
    Ok(PluginConfigs { configs })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["ImagePolicy".into(), "LimitRanger".into()]
    }

    #[test]
    fn paths_resolve_against_the_config_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("image-policy.yaml"), "allowTTL: 50\n").unwrap();
        let config = dir.path().join("admission.yaml");
        fs::write(
            &config,
            r#"
apiVersion: apiserver.config.k8s.io/v1
kind: AdmissionConfiguration
plugins:
- name: ImagePolicy
  path: image-policy.yaml
- name: LimitRanger
  configuration:
    limit: 3
"#,
        )
        .unwrap();

        let configs = read_admission_configuration(&names(), Some(&config), &codecs()).unwrap();
        assert_eq!(
            configs.config_for("ImagePolicy").unwrap().as_deref(),
            Some(&b"allowTTL: 50\n"[..])
        );
        let inline = configs.config_for("LimitRanger").unwrap().unwrap();
        let inline: serde_json::Value = serde_json::from_slice(&inline).unwrap();
        assert_eq!(inline, serde_json::json!({"limit": 3}));
        assert_eq!(configs.config_for("Other").unwrap(), None);
    }

    #[test]
    fn foreign_files_are_shared_by_every_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("legacy.json");
        fs::write(&config, r#"{"imagePolicy":{"allowTTL":50}}"#).unwrap();
        let configs = read_admission_configuration(&names(), Some(&config), &codecs()).unwrap();
        assert_eq!(configs.plugins().collect::<Vec<_>>(), ["ImagePolicy", "LimitRanger"]);
    }

    #[test]
    fn missing_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("admission.json");
        let err = read_admission_configuration(&names(), Some(&config), &codecs()).unwrap_err();
        assert!(matches!(err, AdmissionError::Configuration { path, .. } if path == config));

        fs::write(
            &config,
            r#"{"apiVersion":"apiserver.config.k8s.io/v1","kind":"AdmissionConfiguration","plugins":[{"name":"ImagePolicy","path":"gone.yaml"}]}"#,
        )
        .unwrap();
        let err = read_admission_configuration(&names(), Some(&config), &codecs()).unwrap_err();
        assert!(matches!(err, AdmissionError::Configuration { path, .. } if path.ends_with("gone.yaml")));

        assert!(read_admission_configuration(&names(), None, &codecs())
            .unwrap()
            .plugins()
            .next()
            .is_none());
    }
}
