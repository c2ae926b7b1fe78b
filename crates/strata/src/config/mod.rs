//! configuration aggregation
//!
//! A unit is configured from two namespaces: the *shared* namespace (platform wide values) and
//! its own *local* namespace. Every field belongs to exactly one of them, see [Field::owner].
//! Nothing is merged field-by-field; a field found in the namespace it does not belong to is
//! never consulted.
//!
//! | field                                  | key                      | owner  |
//! |----------------------------------------|--------------------------|--------|
//! | location, prefix, client, environment  | `Location`, ...          | shared |
//! | tags                                   | `Tags`                   | shared |
//! | plan sku                               | `PlanSku`                | shared |
//! | registry url/credentials               | `DockerSettings`         | shared |
//! | database connection strings            | `ConnectionStrings`      | shared |
//! | deployment kind                        | `DeploymentKind`         | local  |
//! | secret policy                          | `SecretPolicy`           | local  |
//! | resource names                         | `ResourcesNames`         | local  |
//! | image names/tags                       | `DockerSettings`         | local  |
//! | storage account                        | `StorageAccount`         | local  |
//! | blob account names                     | `Database`               | local  |
//! | api/function app settings              | `<Unit>ApiAppSettings`.. | local  |
//!
//! Reading a configuration collects *all* problems before failing, see [ConfigErrors].
mod app;
mod shared;

pub use app::{
    BlobConnection, DeploymentConfig, DeploymentKind, PlanSku, RegistrySettings,
    StorageAccountSettings, UnitProfile,
};
pub use shared::{ApiManagementSettings, ApiManagementSku, RegistrySku, SharedConfig};

use crate::namespace::{Namespace, Section};
use crate::secrets::SecretPolicy;
use indexmap::IndexMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required configuration `{path}` in namespace `{namespace}`")]
    Missing { namespace: String, path: String },
    #[error("Configuration `{path}` in namespace `{namespace}` must be {expected}, found {found}")]
    TypeMismatch {
        namespace: String,
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl ConfigError {
    pub fn missing(namespace: impl Into<String>, path: impl Into<String>) -> Self {
        ConfigError::Missing {
            namespace: namespace.into(),
            path: path.into(),
        }
    }

    pub fn mismatch(
        namespace: impl Into<String>,
        path: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        ConfigError::TypeMismatch {
            namespace: namespace.into(),
            path: path.into(),
            expected,
            found,
        }
    }

    /// Field path of the offending configuration entry
    pub fn path(&self) -> &str {
        match self {
            ConfigError::Missing { path, .. } | ConfigError::TypeMismatch { path, .. } => path,
        }
    }
}

/// All problems found while reading a configuration
#[derive(derive_new::new, Debug, Default)]
pub struct ConfigErrors {
    #[new(default)]
    issues: Vec<ConfigError>,
}

impl ConfigErrors {
    pub fn log(&mut self, issue: ConfigError) {
        tracing::trace!(?issue, "issue found");
        self.issues.push(issue);
    }

    /// Logs the error of `result`, if any
    pub fn check<T>(&mut self, result: Result<T, ConfigError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(issue) => {
                self.log(issue);
                None
            }
        }
    }

    pub fn issues(&self) -> &[ConfigError] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl std::error::Error for ConfigErrors {}

impl std::fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, issue) in self.issues.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Namespace a field is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Shared,
    Local,
}

/// Every configuration field an application unit reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Location,
    Prefix,
    Client,
    Environment,
    Tags,
    PlanSku,
    RegistrySettings,
    ConnectionStrings,
    DeploymentKind,
    SecretPolicy,
    ResourcesNames,
    ImageSettings,
    StorageAccount,
    Database,
    ApiAppSettings,
    FnAppSettings,
}

impl Field {
    pub const fn owner(self) -> Owner {
        match self {
            Field::Location
            | Field::Prefix
            | Field::Client
            | Field::Environment
            | Field::Tags
            | Field::PlanSku
            | Field::RegistrySettings
            | Field::ConnectionStrings => Owner::Shared,
            Field::DeploymentKind
            | Field::SecretPolicy
            | Field::ResourcesNames
            | Field::ImageSettings
            | Field::StorageAccount
            | Field::Database
            | Field::ApiAppSettings
            | Field::FnAppSettings => Owner::Local,
        }
    }

    /// Key of the field inside its owning namespace
    pub fn key(self, unit: &str) -> String {
        match self {
            Field::Location => "Location".into(),
            Field::Prefix => "Prefix".into(),
            Field::Client => "Client".into(),
            Field::Environment => "Environment".into(),
            Field::Tags => "Tags".into(),
            Field::PlanSku => "PlanSku".into(),
            Field::RegistrySettings | Field::ImageSettings => "DockerSettings".into(),
            Field::ConnectionStrings => "ConnectionStrings".into(),
            Field::DeploymentKind => "DeploymentKind".into(),
            Field::SecretPolicy => "SecretPolicy".into(),
            Field::ResourcesNames => "ResourcesNames".into(),
            Field::StorageAccount => "StorageAccount".into(),
            Field::Database => "Database".into(),
            Field::ApiAppSettings => format!("{unit}ApiAppSettings"),
            Field::FnAppSettings => format!("{unit}FnAppSettings"),
        }
    }
}

/// The two namespaces of one unit, resolved through the ownership table
#[derive(derive_new::new, Debug, Clone, Copy)]
pub struct Sources<'a> {
    unit: &'a str,
    shared: &'a Namespace,
    local: &'a Namespace,
}

impl<'a> Sources<'a> {
    pub fn namespace(&self, field: Field) -> &'a Namespace {
        match field.owner() {
            Owner::Shared => self.shared,
            Owner::Local => self.local,
        }
    }

    pub fn require_str(&self, field: Field) -> Result<&'a str, ConfigError> {
        self.namespace(field).require_str(&field.key(self.unit))
    }

    pub fn optional_str(&self, field: Field) -> Result<Option<&'a str>, ConfigError> {
        self.namespace(field).optional_str(&field.key(self.unit))
    }

    pub fn section(&self, field: Field) -> Result<Section<'a>, ConfigError> {
        self.namespace(field).section(&field.key(self.unit))
    }

    pub fn optional_section(&self, field: Field) -> Result<Option<Section<'a>>, ConfigError> {
        self.namespace(field).optional_section(&field.key(self.unit))
    }
}

/// Platform wide values shared by every unit
#[derive(Debug, Clone, serde::Serialize)]
pub struct Platform {
    pub location: String,
    pub prefix: String,
    pub client: String,
    pub environment: String,
    pub tags: IndexMap<String, String>,
}

impl Platform {
    /// Reads the platform fields, logging every problem into `errors`
    pub(crate) fn read(shared: &Namespace, errors: &mut ConfigErrors) -> Option<Self> {
        let location = errors.check(shared.require_str("Location"));
        let prefix = errors.check(shared.require_str("Prefix"));
        let client = errors.check(shared.require_str("Client"));
        let environment = errors.check(shared.require_str("Environment"));
        let tags = errors.check(shared.section("Tags").and_then(|tags| tags.to_str_map()));

        let (Some(location), Some(prefix), Some(client), Some(environment), Some(tags)) =
            (location, prefix, client, environment, tags)
        else {
            return None;
        };

        Some(Self {
            location: location.to_string(),
            prefix: prefix.to_string(),
            client: client.to_string(),
            environment: environment.to_string(),
            tags,
        })
    }

    /// `{client}-{prefix}-{name}`, keeping the configured case
    pub fn dashed_name(&self, name: &str) -> String {
        format!("{}-{}-{}", self.client, self.prefix, name)
    }

    /// `{client}-{prefix}-{name}` with client and prefix lowercased
    pub fn dashed_name_lower(&self, name: &str) -> String {
        format!(
            "{}-{}-{}",
            self.client.to_lowercase(),
            self.prefix.to_lowercase(),
            name
        )
    }

    /// `{client}{prefix}{name}` with client and prefix lowercased, for resources that do
    /// not allow dashes
    pub fn compact_name_lower(&self, name: &str) -> String {
        format!(
            "{}{}{}",
            self.client.to_lowercase(),
            self.prefix.to_lowercase(),
            name
        )
    }
}

/// A string mapping that must contain every one of `keys`
///
/// Missing keys are logged into `errors`; the mapping is returned regardless so that all
/// problems of a configuration are found in one pass.
pub(crate) fn required_str_map<'a>(
    errors: &mut ConfigErrors,
    section: Result<Section<'a>, ConfigError>,
    keys: impl IntoIterator<Item = impl AsRef<str>>,
) -> Option<IndexMap<String, String>> {
    let section = errors.check(section)?;
    let map = errors.check(section.to_str_map())?;
    for key in keys {
        let key = key.as_ref();
        if !map.contains_key(key) {
            errors.log(section.missing(key));
        }
    }
    Some(map)
}

/// The optional `SecretPolicy` key of `namespace`
pub(crate) fn secret_policy(namespace: &Namespace) -> Result<SecretPolicy, ConfigError> {
    match namespace.optional_str("SecretPolicy")? {
        None => Ok(SecretPolicy::default()),
        Some(policy) => SecretPolicy::parse(policy).ok_or_else(|| {
            ConfigError::mismatch(
                namespace.name(),
                "SecretPolicy",
                "`Strict` or `AllowTestFallbacks`",
                "string",
            )
        }),
    }
}
