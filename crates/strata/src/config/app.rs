//! configuration of an application unit
use super::{required_str_map, secret_policy, ConfigError, ConfigErrors, Field, Platform, Sources};
use crate::error::BuildError;
use crate::namespace::{Namespace, Section};
use crate::secrets::{
    build_blob_connection_string, ChainSecretStore, MemorySecretStore, Secret, SecretHandleSet,
    SecretResolver, SecretStore,
};
use crate::value::Mapping;
use indexmap::IndexMap;

/// A blob connection string built from `Database.<account>` and the secret `key`
#[derive(Debug, Clone, Copy)]
pub struct BlobConnection {
    pub name: &'static str,
    pub account: &'static str,
    pub key: &'static str,
}

/// Static description of an application unit
#[derive(Debug)]
pub struct UnitProfile {
    /// Prefix of unit specific keys, e.g. `App1`
    pub name: &'static str,
    /// Name of the local namespace
    pub namespace: &'static str,
    /// Required `ResourcesNames` entries
    pub resource_names: &'static [&'static str],
    /// Whether the unit owns a general purpose storage account
    pub storage_account: bool,
    pub blob_connections: &'static [BlobConnection],
    /// Secrets appended to the api app settings
    pub api_secrets: &'static [&'static str],
    /// Secrets appended to the function app settings
    pub function_secrets: &'static [&'static str],
}

impl UnitProfile {
    /// Required `DockerSettings` entries of the local namespace
    pub fn image_keys(&self) -> Vec<String> {
        ["Api", "Fn"]
            .iter()
            .flat_map(|part| {
                [
                    format!("Docker{}{part}ImageName", self.name),
                    format!("Docker{}{part}ImageTag", self.name),
                ]
            })
            .collect()
    }

    /// Every secret the unit binds, in binding order
    pub fn secret_names(&self) -> Vec<&'static str> {
        let mut names = vec!["DockerRegistryPassword"];
        let candidates = self
            .api_secrets
            .iter()
            .chain(self.function_secrets)
            .copied()
            .chain(self.blob_connections.iter().map(|connection| connection.key))
            .chain(["PrimaryDB", "SecondaryDB"]);
        for name in candidates {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum DeploymentKind {
    Linux,
    Standard,
    Unrecognized(String),
}

impl DeploymentKind {
    pub fn parse(kind: &str) -> Self {
        match kind.to_lowercase().as_str() {
            "linux" => DeploymentKind::Linux,
            "standard" | "windows" => DeploymentKind::Standard,
            _ => {
                tracing::warn!(kind, "unrecognized deployment kind, settings use `:` as separator");
                DeploymentKind::Unrecognized(kind.to_string())
            }
        }
    }

    /// Separator of flattened app setting keys
    pub fn separator(&self) -> &'static str {
        match self {
            DeploymentKind::Linux => "__",
            DeploymentKind::Standard | DeploymentKind::Unrecognized(_) => ":",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PlanSku {
    pub name: String,
    pub tier: String,
    pub size: String,
    pub family: String,
    pub capacity: i64,
}

impl PlanSku {
    fn read(section: &Section<'_>, errors: &mut ConfigErrors) -> Option<Self> {
        let name = errors.check(section.require_str("Name"));
        let tier = errors.check(section.require_str("Tier"));
        let size = errors.check(section.require_str("Size"));
        let family = errors.check(section.require_str("Family"));
        let capacity = errors.check(section.require_integer("Capacity"));

        Some(Self {
            name: name?.to_string(),
            tier: tier?.to_string(),
            size: size?.to_string(),
            family: family?.to_string(),
            capacity: capacity?,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistrySettings {
    pub url: String,
    pub username: String,
    pub password: Secret,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StorageAccountSettings {
    pub kind: String,
    pub sku_name: String,
    pub access_tier: String,
    pub allow_blob_public_access: bool,
    pub minimum_tls_version: String,
    pub enable_https_traffic_only: bool,
}

impl StorageAccountSettings {
    fn read(section: &Section<'_>, errors: &mut ConfigErrors) -> Option<Self> {
        let kind = errors.check(section.require_str("Kind"));
        let sku_name = errors.check(section.require_str("SkuName"));
        let access_tier = errors.check(section.require_str("AccessTier"));
        let allow_blob_public_access = errors.check(section.require_bool("AllowBlobPublicAccess"));
        let minimum_tls_version = errors.check(section.require_str("MinimumTlsVersion"));
        let enable_https_traffic_only = errors.check(section.require_bool("EnableHttpsTrafficOnly"));

        Some(Self {
            kind: kind?.to_string(),
            sku_name: sku_name?.to_string(),
            access_tier: access_tier?.to_string(),
            allow_blob_public_access: allow_blob_public_access?,
            minimum_tls_version: minimum_tls_version?.to_string(),
            enable_https_traffic_only: enable_https_traffic_only?,
        })
    }
}

/// Immutable configuration snapshot of one application unit
#[derive(Debug)]
pub struct DeploymentConfig {
    profile: &'static UnitProfile,
    platform: Platform,
    plan_sku: PlanSku,
    registry: RegistrySettings,
    deployment_kind: DeploymentKind,
    separator: &'static str,
    resource_names: IndexMap<String, String>,
    api_image: String,
    function_image: String,
    storage_account: Option<StorageAccountSettings>,
    blob_connections: Vec<(&'static str, Secret)>,
    api_settings: Mapping,
    function_settings: Mapping,
    secrets: SecretHandleSet,
}

impl DeploymentConfig {
    /// Read `shared` and `local` according to the ownership table and bind all secrets
    ///
    /// Every missing or malformed field is reported; no snapshot is produced if there is any.
    pub fn build(
        profile: &'static UnitProfile,
        shared: &Namespace,
        local: &Namespace,
        store: &dyn SecretStore,
    ) -> Result<Self, BuildError> {
        tracing::info!(unit = profile.name, shared = shared.name(), local = local.name(), "reading configuration");
        let sources = Sources::new(profile.name, shared, local);
        let mut errors = ConfigErrors::new();

        let platform = Platform::read(shared, &mut errors);
        let plan_sku = errors
            .check(sources.section(Field::PlanSku))
            .and_then(|section| PlanSku::read(&section, &mut errors));
        let registry = errors
            .check(sources.section(Field::RegistrySettings))
            .and_then(|section| {
                let url = errors.check(section.require_str("DockerRegistryUrl"));
                let username = errors.check(section.require_str("DockerRegistryUserName"));
                let password = errors.check(section.optional_str("DockerRegistryPassword"));
                Some((url?, username?, password?))
            });
        let connection_strings = errors
            .check(
                sources
                    .optional_section(Field::ConnectionStrings)
                    .and_then(|section| section.map(|section| section.to_str_map()).transpose()),
            )
            .map(Option::unwrap_or_default);

        let deployment_kind = errors
            .check(sources.optional_str(Field::DeploymentKind))
            .map(|kind| DeploymentKind::parse(kind.unwrap_or("standard")));
        let policy = errors.check(secret_policy(sources.namespace(Field::SecretPolicy)));
        let resource_names = required_str_map(
            &mut errors,
            sources.section(Field::ResourcesNames),
            profile.resource_names,
        );
        let images = required_str_map(
            &mut errors,
            sources.section(Field::ImageSettings),
            profile.image_keys(),
        );
        let storage_account = if profile.storage_account {
            errors
                .check(sources.section(Field::StorageAccount))
                .and_then(|section| StorageAccountSettings::read(&section, &mut errors))
                .map(Some)
        } else {
            Some(None)
        };
        let database = required_str_map(
            &mut errors,
            sources.section(Field::Database),
            profile.blob_connections.iter().map(|connection| connection.account),
        );
        let api_settings = errors.check(sources.section(Field::ApiAppSettings));
        let function_settings = errors.check(sources.section(Field::FnAppSettings));

        let (
            Some(platform),
            Some(plan_sku),
            Some((registry_url, registry_username, registry_password)),
            Some(connection_strings),
            Some(deployment_kind),
            Some(policy),
            Some(resource_names),
            Some(images),
            Some(storage_account),
            Some(database),
            Some(api_settings),
            Some(function_settings),
        ) = (
            platform,
            plan_sku,
            registry,
            connection_strings,
            deployment_kind,
            policy,
            resource_names,
            images,
            storage_account,
            database,
            api_settings,
            function_settings,
        )
        else {
            return Err(errors.into());
        };
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let image_settings = local.section(&Field::ImageSettings.key(profile.name))?;
        let api_image = image_reference(&image_settings, registry_url, profile.name, "Api")?;
        let function_image = image_reference(&image_settings, registry_url, profile.name, "Fn")?;

        // registry password and database connection strings are shared values that are
        // resolved like secrets, after the secret store itself
        let mut platform_secrets = MemorySecretStore::new(shared.name());
        if let Some(password) = registry_password {
            platform_secrets.insert("DockerRegistryPassword", password);
        }
        for name in ["PrimaryDB", "SecondaryDB"] {
            if let Some(connection_string) = connection_strings.get(name) {
                platform_secrets.insert(name, connection_string.as_str());
            }
        }
        let stores: Vec<&dyn SecretStore> = vec![store, &platform_secrets];
        let chain = ChainSecretStore::new(stores);
        let secrets = SecretResolver::new(&chain, policy).bind(profile.secret_names())?;

        let blob_connections = profile
            .blob_connections
            .iter()
            .map(|connection| {
                let account = database
                    .get(connection.account)
                    .ok_or_else(|| local.root().missing(&format!("Database.{}", connection.account)))?;
                let key = secrets.get(connection.key)?;
                Ok((connection.name, build_blob_connection_string(account, key)))
            })
            .collect::<Result<Vec<_>, BuildError>>()?;

        let registry = RegistrySettings {
            url: registry_url.to_string(),
            username: registry_username.to_string(),
            password: secrets.get("DockerRegistryPassword")?.clone(),
        };

        tracing::info!(
            unit = profile.name,
            kind = ?deployment_kind,
            separator = deployment_kind.separator(),
            ?policy,
            secrets = secrets.len(),
            "configuration ready"
        );

        Ok(Self {
            profile,
            platform,
            plan_sku,
            registry,
            separator: deployment_kind.separator(),
            deployment_kind,
            resource_names,
            api_image,
            function_image,
            storage_account,
            blob_connections,
            api_settings: api_settings.values().clone(),
            function_settings: function_settings.values().clone(),
            secrets,
        })
    }

    pub fn profile(&self) -> &'static UnitProfile {
        self.profile
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn plan_sku(&self) -> &PlanSku {
        &self.plan_sku
    }

    pub fn registry(&self) -> &RegistrySettings {
        &self.registry
    }

    pub fn deployment_kind(&self) -> &DeploymentKind {
        &self.deployment_kind
    }

    /// Separator of flattened setting keys, derived from the deployment kind
    pub fn separator(&self) -> &'static str {
        self.separator
    }

    pub fn resource_name(&self, key: &str) -> Result<&str, ConfigError> {
        self.resource_names
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::missing(self.profile.namespace, format!("ResourcesNames.{key}")))
    }

    /// `{client}-{prefix}-{name}` of a `ResourcesNames` entry, lowercase client and prefix
    pub fn dashed_name(&self, key: &str) -> Result<String, ConfigError> {
        Ok(self.platform.dashed_name_lower(self.resource_name(key)?))
    }

    /// `{client}{prefix}{name}` of a `ResourcesNames` entry, lowercase client and prefix
    pub fn compact_name(&self, key: &str) -> Result<String, ConfigError> {
        Ok(self.platform.compact_name_lower(self.resource_name(key)?))
    }

    /// `DOCKER|<registry>/<image>:<tag>` of the api app
    pub fn api_image(&self) -> &str {
        &self.api_image
    }

    /// `DOCKER|<registry>/<image>:<tag>` of the function app
    pub fn function_image(&self) -> &str {
        &self.function_image
    }

    pub fn storage_account(&self) -> Option<&StorageAccountSettings> {
        self.storage_account.as_ref()
    }

    pub fn blob_connections(&self) -> &[(&'static str, Secret)] {
        &self.blob_connections
    }

    pub fn api_settings(&self) -> &Mapping {
        &self.api_settings
    }

    pub fn function_settings(&self) -> &Mapping {
        &self.function_settings
    }

    pub fn secrets(&self) -> &SecretHandleSet {
        &self.secrets
    }
}

fn image_reference(
    images: &Section<'_>,
    registry_url: &str,
    unit: &str,
    part: &str,
) -> Result<String, ConfigError> {
    let name = images.require_str(&format!("Docker{unit}{part}ImageName"))?;
    let tag = images.require_str(&format!("Docker{unit}{part}ImageTag"))?;
    Ok(format!("DOCKER|{registry_url}/{name}:{tag}"))
}
