//! the second application unit: api and function app
use super::steps::{self, SettingGroups};
use crate::config::{BlobConnection, DeploymentConfig, UnitProfile};
use crate::error::BuildError;
use crate::namespace::Namespace;
use crate::pipeline::{https_url, Stack, StackBuilder};
use crate::secrets::SecretStore;

pub static PROFILE: UnitProfile = UnitProfile {
    name: "App2",
    namespace: "App2Infrastructure",
    resource_names: &[
        "ResourceGroupName",
        "App2ApiAppServicePlanName",
        "App2ApiAppInsightsName",
        "App2ApiAppServiceName",
        "App2FnStorageAccountName",
        "App2FnAppPlanName",
        "App2FnAppInsightsName",
        "App2FnAppName",
    ],
    storage_account: false,
    blob_connections: &[
        BlobConnection {
            name: "PrimaryBlobStorage",
            account: "PrimaryBlobAccount",
            key: "PrimaryBlobKey",
        },
        BlobConnection {
            name: "SecondaryBlobStorage",
            account: "SecondaryBlobAccount",
            key: "SecondaryBlobKey",
        },
        BlobConnection {
            name: "App2BlobStorage",
            account: "App2BlobAccount",
            key: "App2BlobKey",
        },
    ],
    api_secrets: &["ApiKey", "PrimaryBlobAccountKey", "SecondaryBlobAccountKey"],
    function_secrets: &[
        "ApiKey",
        "PrimaryBlobAccountKey",
        "SecondaryBlobAccountKey",
        "App2FnStorageKey",
    ],
};

const GROUPS: SettingGroups = SettingGroups {
    api: &["StorageSettings", "Common", "ServiceIconsOptions"],
    function: &["Common"],
};

pub fn build(
    shared: &Namespace,
    local: &Namespace,
    store: &dyn SecretStore,
) -> Result<Stack, BuildError> {
    let config = DeploymentConfig::build(&PROFILE, shared, local, store)?;
    compose(&config)
}

pub fn compose(config: &DeploymentConfig) -> Result<Stack, BuildError> {
    let mut stack = StackBuilder::new(PROFILE.namespace);

    let rg = steps::resource_group(&mut stack, config)?;
    let api_plan = steps::plan(&mut stack, config, &rg, "App2ApiAppServicePlanName")?;
    let api_insights = steps::insights(&mut stack, config, &rg, "App2ApiAppInsightsName")?;
    let api = steps::api_app(&mut stack, config, &rg, &api_plan, &api_insights, &GROUPS)?;
    let function_storage = steps::function_storage(&mut stack, config, &rg)?;
    let function_plan = steps::plan(&mut stack, config, &rg, "App2FnAppPlanName")?;
    let function_insights = steps::insights(&mut stack, config, &rg, "App2FnAppInsightsName")?;
    let function = steps::function_app(
        &mut stack,
        config,
        &rg,
        &function_plan,
        &function_insights,
        &function_storage,
        &GROUPS,
    )?;

    stack.export("ResourceGroupName", rg.name())?;
    stack.export("App2ApiUrl", https_url(api.output("defaultHostName")))?;
    stack.export("App2ApiAppServiceName", api.name())?;
    stack.export("App2FunctionUrl", https_url(function.output("defaultHostName")))?;
    stack.export("App2FunctionAppName", function.name())?;

    Ok(stack.finish())
}
