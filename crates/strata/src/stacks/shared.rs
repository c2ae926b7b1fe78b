//! the shared platform unit
//!
//! Declares the resources every application unit relies on. Its outputs are read back as the
//! shared namespace of the application units.
use crate::config::SharedConfig;
use crate::descriptor::{Kind, PropertyBag, PropertyValue, ResourceHandle};
use crate::error::BuildError;
use crate::namespace::Namespace;
use crate::pipeline::{Stack, StackBuilder};
use crate::secrets::SecretStore;
use crate::value::Value;

pub const UNIT: &str = "SharedResources";

const DATABASE_MAX_SIZE_BYTES: i64 = 2_147_483_648;
const DATABASE_COLLATION: &str = "SQL_Latin1_General_CP1_CI_AS";

pub fn build(shared: &Namespace, store: &dyn SecretStore) -> Result<Stack, BuildError> {
    let config = SharedConfig::build(shared, store)?;
    compose(&config)
}

fn located(config: &SharedConfig, rg: &ResourceHandle) -> PropertyBag {
    PropertyBag::new()
        .with("resourceGroupName", rg.name())
        .with("location", config.platform().location.as_str())
}

fn tagged(config: &SharedConfig, bag: PropertyBag) -> PropertyBag {
    bag.with("tags", config.platform().tags.clone())
}

pub fn compose(config: &SharedConfig) -> Result<Stack, BuildError> {
    let mut stack = StackBuilder::new(UNIT);

    let rg = stack.declare(
        config.resource_name("ResourceGroupName")?,
        Kind::ResourceGroup,
        tagged(
            config,
            PropertyBag::new()
                .with("resourceGroupName", config.dashed_name("ResourceGroupName")?)
                .with("location", config.platform().location.as_str()),
        ),
    )?;

    let sql = stack.declare(
        config.resource_name("DatabaseServerName")?,
        Kind::SqlServer,
        tagged(
            config,
            located(config, &rg)
                .with("serverName", config.dashed_name("DatabaseServerName")?)
                .with("administratorLogin", "sqladmin")
                .with("administratorLoginPassword", config.sql_admin_password()?.clone())
                .with("version", "12.0")
                .with("minimalTlsVersion", "1.2"),
        ),
    )?;

    stack.declare(
        "AllowAzureServices",
        Kind::SqlFirewallRule,
        PropertyBag::new()
            .with("firewallRuleName", "AllowAzureServices")
            .with("resourceGroupName", rg.name())
            .with("serverName", sql.name())
            .with("startIpAddress", "0.0.0.0")
            .with("endIpAddress", "0.0.0.0"),
    )?;

    let registry_name = config.resource_name("ContainerRegistryName")?;
    let registry = stack.declare(
        registry_name,
        Kind::ContainerRegistry,
        tagged(
            config,
            located(config, &rg)
                .with("registryName", config.compact_name("ContainerRegistryName")?)
                .with(
                    "sku",
                    PropertyBag::new().with("name", format!("{:?}", config.registry_sku())),
                )
                .with("adminUserEnabled", config.admin_user_enabled()),
        ),
    )?;
    let credentials = stack.declare(
        format!("{registry_name}-credentials"),
        Kind::RegistryCredentials,
        PropertyBag::new()
            .with("resourceGroupName", rg.name())
            .with("registryName", registry.name()),
    )?;

    let insights = stack.declare(
        config.resource_name("ApiManagementInsightsName")?,
        Kind::InsightsComponent,
        tagged(
            config,
            located(config, &rg)
                .with("resourceName", config.dashed_name("ApiManagementInsightsName")?)
                .with("applicationType", "web")
                .with("kind", "web"),
        ),
    )?;

    let api_management = config.api_management();
    let apim = stack.declare(
        config.resource_name("ApiManagementName")?,
        Kind::ApiManagementService,
        tagged(
            config,
            located(config, &rg)
                .with("serviceName", config.dashed_name("ApiManagementName")?)
                .with(
                    "sku",
                    PropertyBag::new()
                        .with("name", format!("{:?}", api_management.sku))
                        .with("capacity", api_management.capacity),
                )
                .with("publisherName", api_management.publisher_name.as_str())
                .with("publisherEmail", api_management.publisher_email.as_str())
                .with("identity", PropertyBag::new().with("type", "SystemAssigned"))
                .with("enableClientCertificate", true),
        ),
    )?;

    stack.declare_with(
        "apim-insights-logger",
        Kind::ApiManagementLogger,
        PropertyBag::new()
            .with("loggerId", "applicationinsights")
            .with("resourceGroupName", rg.name())
            .with("serviceName", apim.name())
            .with("loggerType", "applicationInsights")
            .with("description", "Application Insights logger")
            .with(
                "credentials",
                PropertyBag::new().with("instrumentationKey", insights.output("instrumentationKey")),
            )
            .with("isBuffered", true),
        &[&apim, &insights],
    )?;

    for database in config.databases() {
        stack.declare(
            database.as_str(),
            Kind::SqlDatabase,
            tagged(
                config,
                located(config, &rg)
                    .with("databaseName", database.as_str())
                    .with("serverName", sql.name())
                    .with("sku", PropertyBag::new().with("name", "Basic").with("tier", "Basic"))
                    .with("maxSizeBytes", DATABASE_MAX_SIZE_BYTES)
                    .with("collation", DATABASE_COLLATION),
            ),
        )?;
    }

    stack.export("ResourceGroupName", rg.name())?;
    stack.export("SqlServerName", sql.name())?;
    stack.export("SqlServerFqdn", sql.output("fullyQualifiedDomainName"))?;
    stack.export("ContainerRegistryName", registry.name())?;
    stack.export("ContainerRegistryLoginServer", registry.output("loginServer"))?;
    stack.export("ContainerRegistryUsername", credentials.output("username"))?;
    stack.export("ContainerRegistryPassword", credentials.output("password").secret())?;
    stack.export("ApiManagementName", apim.name())?;
    stack.export("ApiManagementGatewayUrl", apim.output("gatewayUrl"))?;
    stack.export("ApiManagementPortalUrl", apim.output("portalUrl"))?;
    stack.export("ApiManagementInsightsName", insights.name())?;
    stack.export(
        "ApiManagementInsightsInstrumentationKey",
        insights.output("instrumentationKey").secret(),
    )?;
    stack.export(
        "ApiManagementInsightsConnectionString",
        insights.output("connectionString").secret(),
    )?;
    stack.export(
        "DatabaseNames",
        PropertyValue::from(Value::from(config.databases().to_vec())),
    )?;

    Ok(stack.finish())
}
