//! configuration of the shared platform unit
use super::{required_str_map, secret_policy, ConfigError, ConfigErrors, Platform};
use crate::error::BuildError;
use crate::namespace::{Namespace, Section};
use crate::secrets::{Secret, SecretHandleSet, SecretResolver, SecretStore};
use indexmap::IndexMap;

pub const RESOURCE_NAMES: &[&str] = &[
    "ResourceGroupName",
    "DatabaseServerName",
    "ContainerRegistryName",
    "ApiManagementName",
    "ApiManagementInsightsName",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum RegistrySku {
    Basic,
    Standard,
    Premium,
}

impl RegistrySku {
    /// Case insensitive; anything unknown is [RegistrySku::Basic]
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "standard" => RegistrySku::Standard,
            "premium" => RegistrySku::Premium,
            _ => RegistrySku::Basic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ApiManagementSku {
    Developer,
    Basic,
    Standard,
    Premium,
    Consumption,
}

impl ApiManagementSku {
    /// Case insensitive; anything unknown is [ApiManagementSku::Developer]
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "basic" => ApiManagementSku::Basic,
            "standard" => ApiManagementSku::Standard,
            "premium" => ApiManagementSku::Premium,
            "consumption" => ApiManagementSku::Consumption,
            _ => ApiManagementSku::Developer,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiManagementSettings {
    pub sku: ApiManagementSku,
    pub capacity: i64,
    pub publisher_name: String,
    pub publisher_email: String,
}

impl ApiManagementSettings {
    fn read(section: &Section<'_>, errors: &mut ConfigErrors) -> Option<Self> {
        let sku = errors.check(section.require_str("SkuName"));
        let capacity = errors.check(section.require_integer("SkuCapacity"));
        let publisher_name = errors.check(section.require_str("PublisherName"));
        let publisher_email = errors.check(section.require_str("PublisherEmail"));

        Some(Self {
            sku: ApiManagementSku::parse(sku?),
            capacity: capacity?,
            publisher_name: publisher_name?.to_string(),
            publisher_email: publisher_email?.to_string(),
        })
    }
}

/// Immutable configuration snapshot of the shared unit
#[derive(Debug)]
pub struct SharedConfig {
    namespace: String,
    platform: Platform,
    resource_names: IndexMap<String, String>,
    registry_sku: RegistrySku,
    admin_user_enabled: bool,
    api_management: ApiManagementSettings,
    databases: Vec<String>,
    secrets: SecretHandleSet,
}

impl SharedConfig {
    pub fn build(shared: &Namespace, store: &dyn SecretStore) -> Result<Self, BuildError> {
        tracing::info!(namespace = shared.name(), "reading shared configuration");
        let mut errors = ConfigErrors::new();

        let platform = Platform::read(shared, &mut errors);
        let resource_names =
            required_str_map(&mut errors, shared.section("ResourcesNames"), RESOURCE_NAMES);
        let registry = errors.check(shared.section("ContainerRegistry")).and_then(|section| {
            let sku = errors.check(section.require_str("SkuName"));
            let admin_user_enabled = errors.check(section.require_bool("AdminUserEnabled"));
            Some((RegistrySku::parse(sku?), admin_user_enabled?))
        });
        let api_management = errors
            .check(shared.section("ApiManagement"))
            .and_then(|section| ApiManagementSettings::read(&section, &mut errors));
        let databases = errors.check(shared.require_str_list("Databases"));
        let policy = errors.check(secret_policy(shared));

        let (
            Some(platform),
            Some(resource_names),
            Some((registry_sku, admin_user_enabled)),
            Some(api_management),
            Some(databases),
            Some(policy),
        ) = (platform, resource_names, registry, api_management, databases, policy)
        else {
            return Err(errors.into());
        };
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let secrets = SecretResolver::new(store, policy).bind(["SqlAdminPassword"])?;
        tracing::info!(
            databases = databases.len(),
            sku = ?registry_sku,
            ?policy,
            "shared configuration ready"
        );

        Ok(Self {
            namespace: shared.name().to_string(),
            platform,
            resource_names,
            registry_sku,
            admin_user_enabled,
            api_management,
            databases,
            secrets,
        })
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn resource_name(&self, key: &str) -> Result<&str, ConfigError> {
        self.resource_names
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::missing(&self.namespace, format!("ResourcesNames.{key}")))
    }

    /// `{client}-{prefix}-{name}` of a `ResourcesNames` entry, keeping the configured case
    pub fn dashed_name(&self, key: &str) -> Result<String, ConfigError> {
        Ok(self.platform.dashed_name(self.resource_name(key)?))
    }

    /// `{client}{prefix}{name}` of a `ResourcesNames` entry, lowercase client and prefix
    pub fn compact_name(&self, key: &str) -> Result<String, ConfigError> {
        Ok(self.platform.compact_name_lower(self.resource_name(key)?))
    }

    pub fn registry_sku(&self) -> RegistrySku {
        self.registry_sku
    }

    pub fn admin_user_enabled(&self) -> bool {
        self.admin_user_enabled
    }

    pub fn api_management(&self) -> &ApiManagementSettings {
        &self.api_management
    }

    pub fn databases(&self) -> &[String] {
        &self.databases
    }

    pub fn sql_admin_password(&self) -> Result<&Secret, BuildError> {
        Ok(self.secrets.get("SqlAdminPassword")?)
    }
}
