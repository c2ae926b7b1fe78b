//! secret resolution
//!
//! Secrets are looked up in a [SecretStore]. Whether a missing secret is an error or replaced by
//! a literal is decided by the [SecretPolicy] of the unit being built:
//!
//! - [SecretPolicy::Strict] (default): every secret is required
//! - [SecretPolicy::AllowTestFallbacks]: the names in [FALLBACK_ELIGIBLE] fall back to their
//!   literal, every other secret is still required
//!
//! Resolved values are wrapped in [Secret] so they never end up in logs or debug output.
use crate::namespace::Namespace;
use crate::value::Value;
use indexmap::IndexMap;

/// Secret names that may fall back to a literal, and that literal
pub const FALLBACK_ELIGIBLE: &[(&str, &str)] = &[
    ("DockerRegistryPassword", "test"),
    ("PrimaryDB", "test"),
    ("SecondaryDB", "test"),
];

/// A sensitive string
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Derive a new secret from this one
    pub fn map(&self, f: impl FnOnce(&str) -> String) -> Secret {
        Secret(f(&self.0))
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[secret]")
    }
}

impl serde::Serialize for Secret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[secret]")
    }
}

pub trait SecretStore {
    /// Name of the store, used in log messages
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<Secret>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    name: String,
    secrets: IndexMap<String, Secret>,
}

impl MemorySecretStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secrets: IndexMap::new(),
        }
    }

    /// Every top-level string of `namespace` becomes a secret
    pub fn from_namespace(namespace: &Namespace) -> Self {
        let mut store = Self::new(namespace.name());
        for (key, value) in namespace.values() {
            match value {
                Value::String(secret) => store.insert(key.clone(), secret.clone()),
                _ => tracing::trace!(%key, "skipping non-string entry"),
            }
        }
        store
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.secrets.insert(key.into(), Secret::new(value));
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl SecretStore for MemorySecretStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<Secret> {
        self.secrets.get(key).cloned()
    }
}

/// Tries each store in order and returns the first match
pub struct ChainSecretStore<'a> {
    stores: Vec<&'a dyn SecretStore>,
}

impl<'a> ChainSecretStore<'a> {
    pub fn new(stores: Vec<&'a dyn SecretStore>) -> Self {
        Self { stores }
    }
}

impl SecretStore for ChainSecretStore<'_> {
    fn name(&self) -> &str {
        "chain"
    }

    fn get(&self, key: &str) -> Option<Secret> {
        self.stores.iter().find_map(|store| {
            let secret = store.get(key)?;
            tracing::trace!(%key, store = store.name(), "secret found");
            Some(secret)
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum SecretPolicy {
    #[default]
    Strict,
    AllowTestFallbacks,
}

impl SecretPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().replace(['-', '_'], "").as_str() {
            "strict" => Some(SecretPolicy::Strict),
            "allowtestfallbacks" => Some(SecretPolicy::AllowTestFallbacks),
            _ => None,
        }
    }
}

/// How a secret has to be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Requirement {
    Required,
    Fallback(&'static str),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("Secret `{0}` could not be resolved")]
    Unresolved(String),
}

#[derive(derive_new::new)]
pub struct SecretResolver<'a> {
    store: &'a dyn SecretStore,
    policy: SecretPolicy,
}

impl SecretResolver<'_> {
    pub fn resolve_required(&self, name: &str) -> Result<Secret, SecretError> {
        self.store
            .get(name)
            .ok_or_else(|| SecretError::Unresolved(name.to_string()))
    }

    /// Never fails; `fallback` is used when the store lacks `name`
    pub fn resolve_with_fallback(&self, name: &str, fallback: &str) -> Secret {
        self.store.get(name).unwrap_or_else(|| {
            tracing::warn!(secret = name, "secret missing, using test fallback");
            Secret::new(fallback)
        })
    }

    pub fn requirement(&self, name: &str) -> Requirement {
        if self.policy != SecretPolicy::AllowTestFallbacks {
            return Requirement::Required;
        }

        FALLBACK_ELIGIBLE
            .iter()
            .find(|(eligible, _)| *eligible == name)
            .map_or(Requirement::Required, |(_, fallback)| {
                Requirement::Fallback(*fallback)
            })
    }

    pub fn resolve(&self, name: &str) -> Result<SecretHandle, SecretError> {
        let requirement = self.requirement(name);
        let value = match requirement {
            Requirement::Required => self.resolve_required(name)?,
            Requirement::Fallback(fallback) => self.resolve_with_fallback(name, fallback),
        };

        Ok(SecretHandle {
            name: name.to_string(),
            requirement,
            value,
        })
    }

    /// Resolve every name; the first unresolved secret fails the whole set
    pub fn bind<'n>(
        &self,
        names: impl IntoIterator<Item = &'n str>,
    ) -> Result<SecretHandleSet, SecretError> {
        let mut handles = SecretHandleSet::default();
        for name in names {
            if handles.contains(name) {
                continue;
            }
            let handle = self.resolve(name)?;
            handles.handles.insert(handle.name.clone(), handle);
        }

        tracing::debug!(count = handles.len(), store = self.store.name(), "secrets bound");
        Ok(handles)
    }
}

/// A resolved secret together with the policy it was resolved under
#[derive(Debug, Clone, serde::Serialize)]
pub struct SecretHandle {
    pub name: String,
    pub requirement: Requirement,
    pub value: Secret,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(transparent)]
pub struct SecretHandleSet {
    handles: IndexMap<String, SecretHandle>,
}

impl SecretHandleSet {
    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Secret, SecretError> {
        self.handles
            .get(name)
            .map(|handle| &handle.value)
            .ok_or_else(|| SecretError::Unresolved(name.to_string()))
    }

    pub fn handles(&self) -> impl Iterator<Item = &SecretHandle> {
        self.handles.values()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Connection string of a blob account with all four service endpoints
pub fn build_blob_connection_string(account: &str, key: &Secret) -> Secret {
    key.map(|key| {
        format!(
            "DefaultEndpointsProtocol=https;AccountName={account};AccountKey={key};\
             BlobEndpoint=https://{account}.blob.core.windows.net/;\
             QueueEndpoint=https://{account}.queue.core.windows.net/;\
             TableEndpoint=https://{account}.table.core.windows.net/;\
             FileEndpoint=https://{account}.file.core.windows.net/;"
        )
    })
}

/// Connection string of a storage account as used by function runtimes
pub fn build_storage_connection_string(account: &str, key: &str) -> String {
    format!(
        "DefaultEndpointsProtocol=https;AccountName={account};AccountKey={key};EndpointSuffix=core.windows.net"
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> MemorySecretStore {
        MemorySecretStore::new("secrets").with("ApiKey", "api-key")
    }

    #[test]
    fn secrets_are_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret([redacted])");
        assert_eq!(secret.to_string(), "[secret]");
        assert_eq!(serde_json::to_string(&secret).unwrap(), r#""[secret]""#);
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn required_secret() {
        let store = store();
        let resolver = SecretResolver::new(&store, SecretPolicy::Strict);
        assert_eq!(resolver.resolve_required("ApiKey").unwrap().expose(), "api-key");
        assert_eq!(
            resolver.resolve_required("Missing").unwrap_err(),
            SecretError::Unresolved("Missing".into())
        );
    }

    #[test]
    fn fallback_primitive_never_fails() {
        let store = store();
        let resolver = SecretResolver::new(&store, SecretPolicy::Strict);
        assert_eq!(resolver.resolve_with_fallback("ApiKey", "x").expose(), "api-key");
        assert_eq!(resolver.resolve_with_fallback("Missing", "x").expose(), "x");
    }

    #[test]
    fn strict_policy_requires_everything() {
        let store = store();
        let resolver = SecretResolver::new(&store, SecretPolicy::Strict);
        assert_eq!(resolver.requirement("PrimaryDB"), Requirement::Required);
        assert_eq!(
            resolver.resolve("PrimaryDB").unwrap_err(),
            SecretError::Unresolved("PrimaryDB".into())
        );
    }

    #[test]
    fn test_fallbacks_only_for_eligible_names() {
        let store = store();
        let resolver = SecretResolver::new(&store, SecretPolicy::AllowTestFallbacks);

        let handle = resolver.resolve("PrimaryDB").unwrap();
        assert_eq!(handle.requirement, Requirement::Fallback("test"));
        assert_eq!(handle.value.expose(), "test");

        assert_eq!(
            resolver.resolve("App1FnStorageKey").unwrap_err(),
            SecretError::Unresolved("App1FnStorageKey".into())
        );
    }

    #[test]
    fn bind_fails_on_first_unresolved() {
        let store = store();
        let resolver = SecretResolver::new(&store, SecretPolicy::AllowTestFallbacks);

        let handles = resolver
            .bind(["ApiKey", "SecondaryDB", "ApiKey"])
            .unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles.get("SecondaryDB").unwrap().expose(), "test");

        assert_eq!(
            resolver.bind(["ApiKey", "Nope", "Other"]).unwrap_err(),
            SecretError::Unresolved("Nope".into())
        );
    }

    #[test]
    fn chain_prefers_earlier_stores() {
        let first = MemorySecretStore::new("first").with("PrimaryDB", "from-first");
        let second = MemorySecretStore::new("second")
            .with("PrimaryDB", "from-second")
            .with("SecondaryDB", "only-second");
        let stores: Vec<&dyn SecretStore> = vec![&first, &second];
        let chain = ChainSecretStore::new(stores);

        assert_eq!(chain.get("PrimaryDB").unwrap().expose(), "from-first");
        assert_eq!(chain.get("SecondaryDB").unwrap().expose(), "only-second");
        assert!(chain.get("ApiKey").is_none());
    }

    #[test]
    fn store_from_namespace_takes_strings() {
        let namespace = crate::namespace!("App1Infrastructure" => {"ApiKey": "k", "Nested": {"a": 1}});
        let store = MemorySecretStore::from_namespace(&namespace);
        assert_eq!(store.len(), 1);
        assert_eq!(store.name(), "App1Infrastructure");
    }

    #[test]
    fn policy_names() {
        assert_eq!(SecretPolicy::parse("Strict"), Some(SecretPolicy::Strict));
        assert_eq!(
            SecretPolicy::parse("allow-test-fallbacks"),
            Some(SecretPolicy::AllowTestFallbacks)
        );
        assert_eq!(
            SecretPolicy::parse("AllowTestFallbacks"),
            Some(SecretPolicy::AllowTestFallbacks)
        );
        assert_eq!(SecretPolicy::parse("lenient"), None);
    }

    #[test]
    fn connection_string_templates() {
        let blob = build_blob_connection_string("acmeprimary", &Secret::new("k1"));
        assert_eq!(
            blob.expose(),
            "DefaultEndpointsProtocol=https;AccountName=acmeprimary;AccountKey=k1;\
             BlobEndpoint=https://acmeprimary.blob.core.windows.net/;\
             QueueEndpoint=https://acmeprimary.queue.core.windows.net/;\
             TableEndpoint=https://acmeprimary.table.core.windows.net/;\
             FileEndpoint=https://acmeprimary.file.core.windows.net/;"
        );
        assert_eq!(
            build_storage_connection_string("acmedevfn", "k2"),
            "DefaultEndpointsProtocol=https;AccountName=acmedevfn;AccountKey=k2;EndpointSuffix=core.windows.net"
        );
    }
}
