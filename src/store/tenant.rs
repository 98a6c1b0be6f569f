//! Tenant resolution: store interface, YAML file store, TTL cache.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{TenantContext, TenantError};

/// Tenant/credential store interface. Pure lookup, no business logic, no
/// retries: failures reject the inbound event immediately.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get_tenant(&self, key: &str) -> Result<TenantContext, TenantError>;
}

/// Map-backed store for tests and embedding
#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: HashMap<String, TenantContext>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant: TenantContext) -> Self {
        self.tenants.insert(tenant.tenant_id.clone(), tenant);
        self
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn get_tenant(&self, key: &str) -> Result<TenantContext, TenantError> {
        let tenant = self
            .tenants
            .get(key)
            .cloned()
            .ok_or_else(|| TenantError::NotFound(key.to_string()))?;

        if !tenant.enabled {
            return Err(TenantError::Disabled(key.to_string()));
        }
        Ok(tenant)
    }
}

/// Schema of a `tenants.yaml` file
#[derive(Debug, Clone, Deserialize)]
pub struct TenantFile {
    pub tenants: Vec<TenantContext>,
}

impl TenantFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tenant file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: TenantFile =
            serde_yaml::from_str(content).context("Failed to parse tenant YAML")?;
        file.validate()?;
        Ok(file)
    }

    /// Reject structurally broken files before they reach the router
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for tenant in &self.tenants {
            if tenant.tenant_id.is_empty() {
                anyhow::bail!("Tenant with an empty tenant_id");
            }
            if !seen.insert(&tenant.tenant_id) {
                anyhow::bail!("Duplicate tenant_id: {}", tenant.tenant_id);
            }
        }
        Ok(())
    }
}

/// Store backed by a tenants file loaded once at startup
pub struct YamlTenantStore {
    tenants: HashMap<String, TenantContext>,
}

impl YamlTenantStore {
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::from_tenant_file(TenantFile::from_file(path)?))
    }

    pub fn from_tenant_file(file: TenantFile) -> Self {
        Self {
            tenants: file
                .tenants
                .into_iter()
                .map(|t| (t.tenant_id.clone(), t))
                .collect(),
        }
    }

    pub fn tenant_ids(&self) -> Vec<&str> {
        self.tenants.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl TenantStore for YamlTenantStore {
    async fn get_tenant(&self, key: &str) -> Result<TenantContext, TenantError> {
        let tenant = self
            .tenants
            .get(key)
            .cloned()
            .ok_or_else(|| TenantError::NotFound(key.to_string()))?;

        if !tenant.enabled {
            return Err(TenantError::Disabled(key.to_string()));
        }
        Ok(tenant)
    }
}

/// Short-lived read-through cache in front of a tenant store.
///
/// Explicit and injected, constructed once per process. Only successful
/// lookups are cached; disabled/unknown tenants are re-checked every time
/// so an operator toggle takes effect within one TTL.
pub struct TenantCache {
    store: Arc<dyn TenantStore>,
    ttl: Duration,
    entries: Mutex<HashMap<String, (TenantContext, Instant)>>,
}

impl TenantCache {
    pub fn new(store: Arc<dyn TenantStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TenantStore for TenantCache {
    async fn get_tenant(&self, key: &str) -> Result<TenantContext, TenantError> {
        {
            let entries = self.entries.lock().expect("tenant cache poisoned");
            if let Some((tenant, cached_at)) = entries.get(key) {
                if cached_at.elapsed() < self.ttl {
                    return Ok(tenant.clone());
                }
            }
        }

        let tenant = self.store.get_tenant(key).await?;
        debug!(tenant = %tenant.tenant_id, "Tenant cache refresh");

        let mut entries = self.entries.lock().expect("tenant cache poisoned");
        entries.insert(key.to_string(), (tenant.clone(), Instant::now()));
        Ok(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;

    const TENANTS_YAML: &str = r#"
tenants:
  - tenant_id: acme
    domain: medical
  - tenant_id: pharma-plus
    domain: pharmacy
    enabled: false
"#;

    #[tokio::test]
    async fn test_yaml_store_lookup() {
        let store = YamlTenantStore::from_tenant_file(TenantFile::from_yaml(TENANTS_YAML).unwrap());

        let tenant = store.get_tenant("acme").await.unwrap();
        assert_eq!(tenant.domain, Domain::Medical);

        assert!(matches!(
            store.get_tenant("nobody").await,
            Err(TenantError::NotFound(_))
        ));
        assert!(matches!(
            store.get_tenant("pharma-plus").await,
            Err(TenantError::Disabled(_))
        ));
    }

    #[test]
    fn test_duplicate_tenant_ids_rejected() {
        let yaml = r#"
tenants:
  - tenant_id: acme
    domain: medical
  - tenant_id: acme
    domain: pharmacy
"#;
        assert!(TenantFile::from_yaml(yaml).is_err());
    }

    #[tokio::test]
    async fn test_cache_serves_within_ttl() {
        let inner = Arc::new(
            InMemoryTenantStore::new()
                .with_tenant(TenantContext::new("acme", Domain::Medical)),
        );
        let cache = TenantCache::new(inner, Duration::from_secs(60));

        let first = cache.get_tenant("acme").await.unwrap();
        let second = cache.get_tenant("acme").await.unwrap();
        assert_eq!(first.tenant_id, second.tenant_id);
    }

    #[tokio::test]
    async fn test_cache_does_not_mask_unknown_tenants() {
        let cache = TenantCache::new(
            Arc::new(InMemoryTenantStore::new()),
            Duration::from_secs(60),
        );
        assert!(matches!(
            cache.get_tenant("ghost").await,
            Err(TenantError::NotFound(_))
        ));
    }
}
