//! the first application unit: api, function app, storage account and an event topic
use super::steps::{self, SettingGroups};
use crate::config::{BlobConnection, DeploymentConfig, UnitProfile};
use crate::error::BuildError;
use crate::namespace::Namespace;
use crate::pipeline::{https_url, Stack, StackBuilder};
use crate::secrets::SecretStore;

const BLOB_KEYS: [&str; 3] = [
    "PrimaryBlobAccountKey",
    "SecondaryBlobAccountKey",
    "App1BlobAccountKey",
];

pub static PROFILE: UnitProfile = UnitProfile {
    name: "App1",
    namespace: "App1Infrastructure",
    resource_names: &[
        "ResourceGroupName",
        "App1ApiAppServicePlanName",
        "App1ApiAppInsightsName",
        "App1ApiAppServiceName",
        "App1StorageAccountName",
        "App1FnStorageAccountName",
        "App1FnAppPlanName",
        "App1FnAppInsightsName",
        "App1FnAppName",
        "App1EventsBookingTopicName",
    ],
    storage_account: true,
    blob_connections: &[
        BlobConnection {
            name: "PrimaryBlobStorage",
            account: "PrimaryBlobAccount",
            key: BLOB_KEYS[0],
        },
        BlobConnection {
            name: "SecondaryBlobStorage",
            account: "SecondaryBlobAccount",
            key: BLOB_KEYS[1],
        },
        BlobConnection {
            name: "App1BlobStorage",
            account: "App1BlobAccount",
            key: BLOB_KEYS[2],
        },
    ],
    api_secrets: &[
        "ApiKey",
        BLOB_KEYS[0],
        BLOB_KEYS[1],
        BLOB_KEYS[2],
        "App1EventsTopicKey",
    ],
    function_secrets: &[
        "ApiKey",
        BLOB_KEYS[0],
        BLOB_KEYS[1],
        BLOB_KEYS[2],
        "App1EventsTopicKey",
        "App1FnStorageKey",
    ],
};

const GROUPS: SettingGroups = SettingGroups {
    api: &["App1Events", "StorageSettings", "Common", "ServiceIconsOptions"],
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
    let api_plan = steps::plan(&mut stack, config, &rg, "App1ApiAppServicePlanName")?;
    let api_insights = steps::insights(&mut stack, config, &rg, "App1ApiAppInsightsName")?;
    let api = steps::api_app(&mut stack, config, &rg, &api_plan, &api_insights, &GROUPS)?;
    let storage = steps::storage_account(&mut stack, config, &rg)?;
    let function_storage = steps::function_storage(&mut stack, config, &rg)?;
    let function_plan = steps::plan(&mut stack, config, &rg, "App1FnAppPlanName")?;
    let function_insights = steps::insights(&mut stack, config, &rg, "App1FnAppInsightsName")?;
    let function = steps::function_app(
        &mut stack,
        config,
        &rg,
        &function_plan,
        &function_insights,
        &function_storage,
        &GROUPS,
    )?;
    let (topic, topic_keys) = steps::topic(&mut stack, config, &rg, "App1EventsBookingTopicName")?;

    stack.export("ResourceGroupName", rg.name())?;
    stack.export("App1ApiUrl", https_url(api.output("defaultHostName")))?;
    stack.export("App1ApiAppServiceName", api.name())?;
    if let Some(storage) = storage {
        stack.export("App1StorageAccountName", storage.name())?;
        stack.export(
            "App1StorageAccountPrimaryEndpoint",
            storage.output("primaryBlobEndpoint"),
        )?;
    }
    stack.export("App1FunctionUrl", https_url(function.output("defaultHostName")))?;
    stack.export("App1FunctionAppName", function.name())?;
    stack.export("App1EventsTopicEndpoint", topic.output("endpoint"))?;
    stack.export("App1EventsTopicKey", topic_keys.output("key1").secret())?;

    Ok(stack.finish())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stacks::fixture;
    use pretty_assertions::assert_eq;

    #[test]
    fn function_app_waits_for_storage_keys() {
        let (shared, local, secrets) = fixture::namespaces(&PROFILE);
        let stack = build(&shared, &local, &secrets).unwrap();

        let function = stack.descriptor("app1-fn").unwrap();
        assert_eq!(
            function.depends_on.iter().collect::<Vec<_>>(),
            vec![
                "app1-fn-insights",
                "app1-fn-plan",
                "app1fnstore",
                "app1fnstore-keys",
                "resourcegroup"
            ]
        );

        let storage = stack.descriptor("app1store").unwrap();
        assert_eq!(
            storage.depends_on.iter().collect::<Vec<_>>(),
            vec!["resourcegroup"]
        );
    }

    #[test]
    fn settings_are_flattened_with_the_unit_separator() {
        let (shared, local, secrets) = fixture::namespaces(&PROFILE);
        let stack = build(&shared, &local, &secrets).unwrap();
        let api = serde_json::to_value(&stack.descriptor("app1-api").unwrap().properties).unwrap();

        let names: Vec<&str> = api["siteConfig"]["appSettings"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|setting| setting["name"].as_str())
            .collect();
        assert!(names.contains(&"App1Events__BookingTopic"));
        assert!(names.contains(&"StorageSettings__Container"));
        assert!(names.contains(&"Common__Mode"));
        assert!(names.contains(&"ServiceIconsOptions__Theme__Dark"));
        assert!(!names.iter().any(|name| name.starts_with("Legacy")));
        assert_eq!(names.last(), Some(&"App1EventsTopicKey"));
        assert_eq!(api["siteConfig"]["healthCheckPath"], "/api/health");
        assert_eq!(
            api["siteConfig"]["linuxFxVersion"],
            "DOCKER|acmedevregistry.azurecr.io/app1-api:1.4.2"
        );
    }
}
