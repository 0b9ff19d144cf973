//! Client configuration for plugins that call out to webhooks.
use std::{collections::BTreeMap, fmt, time::Duration};

use bytes::Bytes;

use crate::{
    certificates::CAContentProvider,
    error::{AdmissionError, Result},
};

/// Default timeout for webhook calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns an in-cluster service reference into a URL
pub trait ServiceResolver: Send + Sync {
    /// The base URL for port `port` of service `name` in `namespace`
    fn resolve_endpoint(&self, namespace: &str, name: &str, port: u16) -> Result<String>;
}

/// Resolves services through cluster DNS: `https://{name}.{namespace}.svc:{port}`
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultServiceResolver;

impl ServiceResolver for DefaultServiceResolver {
    fn resolve_endpoint(&self, namespace: &str, name: &str, port: u16) -> Result<String> {
        if namespace.is_empty() || name.is_empty() {
            return Err(AdmissionError::Internal(format!(
                "cannot resolve service {namespace:?}/{name:?}: namespace and name are required"
            )));
        }
        Ok(format!("https://{}:{port}", service_host(namespace, name)))
    }
}

fn service_host(namespace: &str, name: &str) -> String {
    format!("{name}.{namespace}.svc")
}

/// Credentials presented to one webhook host
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthInfo {
    /// PEM client certificate
    pub client_certificate_data: Bytes,
    /// PEM client key
    pub client_key_data: Bytes,
    /// Bearer token
    pub token: Option<String>,
}

impl fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInfo")
            .field("client_certificate_data", &!self.client_certificate_data.is_empty())
            .field("client_key_data", &"<redacted>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything needed to open a connection to a webhook
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the webhook
    pub host: String,
    /// Name to verify the server certificate against, when it differs from the host
    pub server_name: String,
    /// PEM bundle trusted for the server certificate
    pub ca_data: Bytes,
    /// Client credentials
    pub auth: AuthInfo,
    /// Timeout for each call
    pub timeout: Option<Duration>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("server_name", &self.server_name)
            .field("ca_data", &self.ca_data.len())
            .field("auth", &self.auth)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Trust the CA bundle currently held by `ca`
    #[must_use]
    pub fn with_ca_content(mut self, ca: &dyn CAContentProvider) -> Self {
        self.ca_data = ca.current_ca_bundle_content();
        self
    }
}

/// Finds the credentials to present to a webhook
pub trait AuthenticationInfoResolver: Send + Sync {
    /// Configuration for a webhook reached by URL
    fn client_config_for(&self, host: &str) -> Result<ClientConfig>;

    /// Configuration for a webhook served by an in-cluster service
    fn client_config_for_service(&self, name: &str, namespace: &str, port: u16) -> Result<ClientConfig>;
}

/// Credentials looked up by host, with `*` as the fallback entry
#[derive(Clone, Debug, Default)]
pub struct DefaultAuthenticationInfoResolver {
    auth_infos: BTreeMap<String, AuthInfo>,
    timeout: Option<Duration>,
}

impl DefaultAuthenticationInfoResolver {
    /// Look up credentials in `auth_infos`, keyed by `host` or `host:port`
    pub fn new(auth_infos: BTreeMap<String, AuthInfo>) -> Self {
        Self {
            auth_infos,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Set the timeout handed out with every configuration
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn lookup(&self, keys: &[&str]) -> AuthInfo {
        keys.iter()
            .chain(std::iter::once(&"*"))
            .find_map(|key| self.auth_infos.get(*key))
            .cloned()
            .unwrap_or_default()
    }
}

fn host_port(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?', '#']).next().unwrap_or(rest)
}

impl AuthenticationInfoResolver for DefaultAuthenticationInfoResolver {
    fn client_config_for(&self, host: &str) -> Result<ClientConfig> {
        let authority = host_port(host);
        if authority.is_empty() {
            return Err(AdmissionError::Internal(format!("no host in webhook URL {host:?}")));
        }
        let hostname = authority.rsplit_once(':').map_or(authority, |(h, _)| h);
        Ok(ClientConfig {
            host: host.to_string(),
            auth: self.lookup(&[authority, hostname]),
            timeout: self.timeout,
            ..ClientConfig::default()
        })
    }

    fn client_config_for_service(&self, name: &str, namespace: &str, port: u16) -> Result<ClientConfig> {
        let host = service_host(namespace, name);
        let authority = format!("{host}:{port}");
        Ok(ClientConfig {
            host: format!("https://{authority}"),
            server_name: host.clone(),
            auth: self.lookup(&[authority.as_str(), host.as_str()]),
            timeout: self.timeout,
            ..ClientConfig::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificates::{tests::ca, StaticCAContent};

    fn token(t: &str) -> AuthInfo {
        AuthInfo {
            token: Some(t.into()),
            ..AuthInfo::default()
        }
    }

    #[test]
    fn services_resolve_through_cluster_dns() {
        let url = DefaultServiceResolver.resolve_endpoint("webhooks", "policy", 8443).unwrap();
        assert_eq!(url, "https://policy.webhooks.svc:8443");
        assert!(DefaultServiceResolver.resolve_endpoint("", "policy", 443).is_err());
    }

    #[test]
    fn credentials_prefer_the_most_specific_entry() {
        let resolver = DefaultAuthenticationInfoResolver::new(BTreeMap::from([
            ("hooks.example.com:8443".to_string(), token("port")),
            ("hooks.example.com".to_string(), token("host")),
            ("policy.webhooks.svc".to_string(), token("service")),
            ("*".to_string(), token("fallback")),
        ]));

        let config = resolver.client_config_for("https://hooks.example.com:8443/validate").unwrap();
        assert_eq!(config.auth.token.as_deref(), Some("port"));
        assert_eq!(config.timeout, Some(DEFAULT_TIMEOUT));

        let config = resolver.client_config_for("https://hooks.example.com/validate").unwrap();
        assert_eq!(config.auth.token.as_deref(), Some("host"));

        let config = resolver.client_config_for("https://elsewhere.example.com").unwrap();
        assert_eq!(config.auth.token.as_deref(), Some("fallback"));

        let config = resolver.client_config_for_service("policy", "webhooks", 443).unwrap();
        assert_eq!(config.host, "https://policy.webhooks.svc:443");
        assert_eq!(config.server_name, "policy.webhooks.svc");
        assert_eq!(config.auth.token.as_deref(), Some("service"));

        assert!(resolver.client_config_for("https://").is_err());
    }

    #[test]
    fn ca_content_is_snapshotted() {
        let ca_content = StaticCAContent::new("webhook-ca", ca(7)).unwrap();
        let config = ClientConfig::default().with_ca_content(&ca_content);
        assert_eq!(config.ca_data, ca(7).as_bytes());
        assert!(!format!("{config:?}").contains("BEGIN"));
    }
}
