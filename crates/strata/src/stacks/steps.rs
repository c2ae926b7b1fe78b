//! build steps shared by the application units
//!
//! Every step declares one descriptor (two for resources whose keys are read through a separate
//! lookup) and returns the handles later steps reference.
use crate::config::DeploymentConfig;
use crate::deferred::Deferred;
use crate::descriptor::{Kind, PropertyBag, PropertyValue, ResourceHandle};
use crate::error::BuildError;
use crate::pipeline::StackBuilder;
use crate::secrets::build_storage_connection_string;
use crate::settings::SettingsBuilder;
use crate::value::{Mapping, Value};

pub const API_HEALTH_CHECK: &str = "/api/health";
pub const FUNCTION_HEALTH_CHECK: &str = "/api/HealthCheck";

/// Top-level scalars of the api settings copied verbatim
const API_SCALARS: &[&str] = &["DisableHttpsRedirection", "AllowedHosts"];

/// Setting groups recognized for an app, by part
#[derive(Debug, Clone, Copy)]
pub struct SettingGroups {
    pub api: &'static [&'static str],
    pub function: &'static [&'static str],
}

/// A storage account and the lookup of its access keys
#[derive(Debug)]
pub struct StorageHandles {
    pub account: ResourceHandle,
    pub keys: ResourceHandle,
}

fn common(config: &DeploymentConfig, rg: &ResourceHandle) -> PropertyBag {
    PropertyBag::new()
        .with("resourceGroupName", rg.name())
        .with("location", config.platform().location.as_str())
}

fn tagged(config: &DeploymentConfig, bag: PropertyBag) -> PropertyBag {
    bag.with("tags", config.platform().tags.clone())
}

fn health_check(settings: &Mapping, default: &str) -> String {
    settings
        .get("HealthCheck")
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

pub fn resource_group(
    stack: &mut StackBuilder,
    config: &DeploymentConfig,
) -> Result<ResourceHandle, BuildError> {
    let properties = PropertyBag::new()
        .with("resourceGroupName", config.dashed_name("ResourceGroupName")?)
        .with("location", config.platform().location.as_str());
    Ok(stack.declare("resourcegroup", Kind::ResourceGroup, tagged(config, properties))?)
}

pub fn plan(
    stack: &mut StackBuilder,
    config: &DeploymentConfig,
    rg: &ResourceHandle,
    name_key: &str,
) -> Result<ResourceHandle, BuildError> {
    let sku = config.plan_sku();
    let properties = common(config, rg)
        .with("name", config.dashed_name(name_key)?)
        .with("kind", "linux")
        .with("reserved", true)
        .with(
            "sku",
            PropertyBag::new()
                .with("name", sku.name.as_str())
                .with("tier", sku.tier.as_str())
                .with("size", sku.size.as_str())
                .with("family", sku.family.as_str())
                .with("capacity", sku.capacity),
        );
    Ok(stack.declare(
        config.resource_name(name_key)?,
        Kind::AppServicePlan,
        tagged(config, properties),
    )?)
}

pub fn insights(
    stack: &mut StackBuilder,
    config: &DeploymentConfig,
    rg: &ResourceHandle,
    name_key: &str,
) -> Result<ResourceHandle, BuildError> {
    let properties = common(config, rg)
        .with("resourceName", config.dashed_name(name_key)?)
        .with("applicationType", "web")
        .with("kind", "web");
    Ok(stack.declare(
        config.resource_name(name_key)?,
        Kind::InsightsComponent,
        tagged(config, properties),
    )?)
}

fn connection_strings(config: &DeploymentConfig) -> Result<PropertyValue, BuildError> {
    let secrets = config.secrets();
    let mut entries: Vec<PropertyValue> = vec![];
    let databases = [
        ("PrimaryDataConnection", "PrimaryDB"),
        ("SecondaryDataConnection", "SecondaryDB"),
    ];
    for (name, secret) in databases {
        entries.push(
            PropertyBag::new()
                .with("name", name)
                .with("connectionString", secrets.get(secret)?.clone())
                .with("type", "SQLAzure")
                .into(),
        );
    }
    for (name, connection_string) in config.blob_connections() {
        entries.push(
            PropertyBag::new()
                .with("name", *name)
                .with("connectionString", connection_string.clone())
                .with("type", "Custom")
                .into(),
        );
    }
    Ok(PropertyValue::List(entries))
}

pub fn api_app(
    stack: &mut StackBuilder,
    config: &DeploymentConfig,
    rg: &ResourceHandle,
    plan: &ResourceHandle,
    insights: &ResourceHandle,
    groups: &SettingGroups,
) -> Result<ResourceHandle, BuildError> {
    let profile = config.profile();
    let section = config.api_settings();
    let name_key = format!("{}ApiAppServiceName", profile.name);

    let mut settings = SettingsBuilder::new(config.separator());
    settings
        .push("WEBSITE_RUN_FROM_PACKAGE", "0")
        .push("APPLICATIONINSIGHTS_CONNECTION_STRING", insights.output("connectionString"))
        .registry_credentials(config.registry())
        .scalars(section, API_SCALARS)
        .groups(section, groups.api, &[]);
    let secrets: Vec<(&str, &str)> = profile.api_secrets.iter().map(|name| (*name, *name)).collect();
    settings.secrets(config.secrets(), &secrets)?;

    let site_config = PropertyBag::new()
        .with("alwaysOn", true)
        .with("linuxFxVersion", config.api_image())
        .with("appSettings", settings.build())
        .with("connectionStrings", connection_strings(config)?)
        .with("healthCheckPath", health_check(section, API_HEALTH_CHECK));
    let properties = common(config, rg)
        .with("name", config.dashed_name(&name_key)?)
        .with("kind", "app,linux,container")
        .with("serverFarmId", plan.id())
        .with("siteConfig", site_config);
    Ok(stack.declare(
        config.resource_name(&name_key)?,
        Kind::WebApp,
        tagged(config, properties),
    )?)
}

/// The general purpose storage account of a unit
pub fn storage_account(
    stack: &mut StackBuilder,
    config: &DeploymentConfig,
    rg: &ResourceHandle,
) -> Result<Option<ResourceHandle>, BuildError> {
    let Some(storage) = config.storage_account() else {
        return Ok(None);
    };
    let name_key = format!("{}StorageAccountName", config.profile().name);
    let properties = common(config, rg)
        .with("accountName", config.compact_name(&name_key)?)
        .with("kind", storage.kind.as_str())
        .with("sku", PropertyBag::new().with("name", storage.sku_name.as_str()))
        .with("accessTier", storage.access_tier.as_str())
        .with("allowBlobPublicAccess", storage.allow_blob_public_access)
        .with("minimumTlsVersion", storage.minimum_tls_version.as_str())
        .with("enableHttpsTrafficOnly", storage.enable_https_traffic_only);
    let account = stack.declare(
        config.resource_name(&name_key)?,
        Kind::StorageAccount,
        tagged(config, properties),
    )?;
    Ok(Some(account))
}

/// Storage account of the function runtime, and its keys
pub fn function_storage(
    stack: &mut StackBuilder,
    config: &DeploymentConfig,
    rg: &ResourceHandle,
) -> Result<StorageHandles, BuildError> {
    let name_key = format!("{}FnStorageAccountName", config.profile().name);
    let properties = common(config, rg)
        .with("accountName", config.compact_name(&name_key)?)
        .with("kind", "StorageV2")
        .with("sku", PropertyBag::new().with("name", "Standard_LRS"));
    let logical_name = config.resource_name(&name_key)?;
    let account = stack.declare(logical_name, Kind::StorageAccount, tagged(config, properties))?;

    let keys = stack.declare(
        format!("{logical_name}-keys"),
        Kind::StorageAccountKeys,
        PropertyBag::new()
            .with("resourceGroupName", rg.name())
            .with("accountName", account.name()),
    )?;
    Ok(StorageHandles { account, keys })
}

/// Connection string of the function runtime storage; only known once the keys are listed
pub fn web_jobs_storage(storage: &StorageHandles) -> Deferred {
    Deferred::zip(
        vec![storage.account.name(), storage.keys.output("key1")],
        |values: &[String]| build_storage_connection_string(&values[0], &values[1]),
    )
    .secret()
}

pub fn function_app(
    stack: &mut StackBuilder,
    config: &DeploymentConfig,
    rg: &ResourceHandle,
    plan: &ResourceHandle,
    insights: &ResourceHandle,
    storage: &StorageHandles,
    groups: &SettingGroups,
) -> Result<ResourceHandle, BuildError> {
    let profile = config.profile();
    let section = config.function_settings();
    let name_key = format!("{}FnAppName", profile.name);

    let mut settings = SettingsBuilder::new(config.separator());
    settings
        .push("AzureWebJobsStorage", web_jobs_storage(storage))
        .push("FUNCTIONS_WORKER_RUNTIME", "dotnet")
        .push("FUNCTIONS_EXTENSION_VERSION", "~4")
        .push("WEBSITE_RUN_FROM_PACKAGE", "0")
        .push("WEBSITES_ENABLE_APP_SERVICE_STORAGE", "false")
        .push("AzureWebJobsSecretStorageType", "files")
        .push("APPLICATIONINSIGHTS_CONNECTION_STRING", insights.output("connectionString"))
        .registry_credentials(config.registry())
        .nested_scalar(section, "Values", "FUNCTIONS_WORKER_RUNTIME")
        .groups(section, groups.function, &["Values"]);
    let secrets: Vec<(&str, &str)> = profile
        .function_secrets
        .iter()
        .map(|name| (*name, *name))
        .chain([("PrimaryDataConnection", "PrimaryDB"), ("SecondaryDataConnection", "SecondaryDB")])
        .collect();
    settings.secrets(config.secrets(), &secrets)?;

    let site_config = PropertyBag::new()
        .with("alwaysOn", true)
        .with("linuxFxVersion", config.function_image())
        .with("appSettings", settings.build())
        .with("healthCheckPath", health_check(section, FUNCTION_HEALTH_CHECK));
    let properties = common(config, rg)
        .with("name", config.dashed_name(&name_key)?)
        .with("kind", "functionapp,linux,container")
        .with("serverFarmId", plan.id())
        .with("siteConfig", site_config);
    Ok(stack.declare(
        config.resource_name(&name_key)?,
        Kind::WebApp,
        tagged(config, properties),
    )?)
}

/// An event topic and the lookup of its access keys
pub fn topic(
    stack: &mut StackBuilder,
    config: &DeploymentConfig,
    rg: &ResourceHandle,
    name_key: &str,
) -> Result<(ResourceHandle, ResourceHandle), BuildError> {
    let logical_name = config.resource_name(name_key)?;
    let properties = common(config, rg).with("topicName", config.dashed_name(name_key)?);
    let topic = stack.declare(logical_name, Kind::EventGridTopic, tagged(config, properties))?;
    let keys = stack.declare(
        format!("{logical_name}-keys"),
        Kind::TopicAccessKeys,
        PropertyBag::new()
            .with("resourceGroupName", rg.name())
            .with("topicName", topic.name()),
    )?;
    Ok((topic, keys))
}
