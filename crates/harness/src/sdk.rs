//! The narrow surface the engine needs from a generated SDK.
//!
//! Request and response types, signing and transport belong to the SDK.
//! Generated SDK types implement these traits so the engine can attach
//! retry policies, advance page cursors and point clients at the right host.

use std::sync::Arc;

use autotest_wire::TestingConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ClientError;
use crate::retry::RetryPolicy;

// ──────────────────────────────────────────────
// Requests and responses
// ──────────────────────────────────────────────

/// Per-request metadata the transport reads. Never serialized.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub retry_policy: Option<Arc<RetryPolicy>>,
}

/// A typed SDK request.
pub trait OciRequest: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn request_metadata(&self) -> &RequestMetadata;
    fn request_metadata_mut(&mut self) -> &mut RequestMetadata;
}

/// A request for a list operation carrying an opaque page cursor.
pub trait PaginatedRequest: OciRequest {
    fn page(&self) -> Option<&str>;
    fn set_page(&mut self, page: Option<String>);
}

/// A list response carrying the cursor of the following page.
pub trait PaginatedResponse {
    /// The next-page token; `None` or empty ends iteration.
    fn next_page(&self) -> Option<&str>;
}

// ──────────────────────────────────────────────
// Clients
// ──────────────────────────────────────────────

/// Host selection on an SDK client.
pub trait ServiceClient {
    /// Resolve the host from a region identifier.
    fn set_region(&mut self, region: &str);
    /// Use `host` verbatim (scheme included).
    fn set_host(&mut self, host: &str);
    fn host(&self) -> &str;

    /// Point the client at `config`: a non-empty endpoint wins over the region.
    fn configure(&mut self, config: &TestingConfig) {
        match config.endpoint_override() {
            Some(endpoint) => self.set_host(endpoint),
            None => self.set_region(&config.region),
        }
    }
}

/// Second-level domain used when resolving hosts from a region.
pub const DEFAULT_DOMAIN: &str = "oraclecloud.com";

/// Host bookkeeping shared by generated clients.
///
/// `template` contains `{region}` and optionally `{domain}` placeholders,
/// e.g. `https://limits.{region}.{domain}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseClient {
    template: String,
    host: String,
    region: Option<String>,
}

impl BaseClient {
    pub fn new(template: impl Into<String>) -> Self {
        BaseClient {
            template: template.into(),
            host: String::new(),
            region: None,
        }
    }

    /// A client for `service` using the standard host template.
    pub fn for_service(service: &str) -> Self {
        Self::new(format!("https://{}.{{region}}.{{domain}}", service))
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

impl ServiceClient for BaseClient {
    fn set_region(&mut self, region: &str) {
        self.host = self
            .template
            .replace("{region}", region)
            .replace("{domain}", DEFAULT_DOMAIN);
        self.region = Some(region.to_string());
    }

    fn set_host(&mut self, host: &str) {
        self.host = host.to_string();
    }

    fn host(&self) -> &str {
        &self.host
    }
}

// ──────────────────────────────────────────────
// Credentials
// ──────────────────────────────────────────────

/// Source of the credentials an SDK client signs requests with.
pub trait ConfigurationProvider: Send + Sync {
    fn tenancy_ocid(&self) -> Result<String, ClientError>;
    fn user_ocid(&self) -> Result<String, ClientError>;
    fn key_fingerprint(&self) -> Result<String, ClientError>;
    fn region(&self) -> Result<String, ClientError>;

    /// `tenancy/user/fingerprint`, the key id used in request signatures.
    fn key_id(&self) -> Result<String, ClientError> {
        Ok(format!(
            "{}/{}/{}",
            self.tenancy_ocid()?,
            self.user_ocid()?,
            self.key_fingerprint()?
        ))
    }
}

/// Credentials held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticConfigurationProvider {
    pub tenancy: String,
    pub user: String,
    pub fingerprint: String,
    pub region: String,
}

impl ConfigurationProvider for StaticConfigurationProvider {
    fn tenancy_ocid(&self) -> Result<String, ClientError> {
        Ok(self.tenancy.clone())
    }

    fn user_ocid(&self) -> Result<String, ClientError> {
        Ok(self.user.clone())
    }

    fn key_fingerprint(&self) -> Result<String, ClientError> {
        Ok(self.fingerprint.clone())
    }

    fn region(&self) -> Result<String, ClientError> {
        Ok(self.region.clone())
    }
}

/// Credentials read from `<PREFIX>_TENANCY_OCID`, `<PREFIX>_USER_OCID`,
/// `<PREFIX>_FINGERPRINT` and `<PREFIX>_REGION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfigurationProvider {
    prefix: String,
}

impl EnvConfigurationProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        EnvConfigurationProvider {
            prefix: prefix.into(),
        }
    }

    fn read(&self, suffix: &str) -> Result<String, ClientError> {
        let key = format!("{}_{}", self.prefix, suffix);
        std::env::var(&key)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ClientError::Config(format!("environment variable {} is not set", key)))
    }
}

impl Default for EnvConfigurationProvider {
    fn default() -> Self {
        Self::new("OCI")
    }
}

impl ConfigurationProvider for EnvConfigurationProvider {
    fn tenancy_ocid(&self) -> Result<String, ClientError> {
        self.read("TENANCY_OCID")
    }

    fn user_ocid(&self) -> Result<String, ClientError> {
        self.read("USER_OCID")
    }

    fn key_fingerprint(&self) -> Result<String, ClientError> {
        self.read("FINGERPRINT")
    }

    fn region(&self) -> Result<String, ClientError> {
        self.read("REGION")
    }
}
