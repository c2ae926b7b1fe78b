//! Snapshot tests
//!
//! Builds every unit from the stack file in /tests/fixtures/ and compares the rendered plans.
use strata::engine::{provision, DryRunEngine, Outcome, OutputValue};
use strata::namespace::{Format, Namespace};
use strata::pipeline::Stack;
use strata::secrets::MemorySecretStore;
use strata::stacks::Unit;

const STACK: &str = include_str!("fixtures/stack.yaml");

fn namespace(name: &str) -> Namespace {
    Namespace::parse_str(name, STACK, Format::Yaml, None).expect("fixture must be valid")
}

fn build(unit: Unit) -> Stack {
    let shared = namespace(Unit::Shared.namespace());
    let local = namespace(unit.namespace());
    let secrets = MemorySecretStore::from_namespace(&local);
    unit.build(&shared, &local, &secrets).expect("fixture must build")
}

/// `name = value` of every app setting of a web app descriptor
fn app_settings(stack: &Stack, logical_name: &str) -> String {
    let descriptor = stack.descriptor(logical_name).expect("descriptor must exist");
    let properties = serde_json::to_value(&descriptor.properties).unwrap();
    properties["siteConfig"]["appSettings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|setting| {
            format!(
                "{} = {}",
                setting["name"].as_str().unwrap(),
                setting["value"].as_str().unwrap()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn shared_plan() {
    insta::assert_snapshot!(build(Unit::Shared).outline(), @r###"
    shared-rg (resources:ResourceGroup)
    sql (sql:Server) <- shared-rg
    AllowAzureServices (sql:FirewallRule) <- shared-rg, sql
    registry (containerregistry:Registry) <- shared-rg
    registry-credentials (containerregistry:listRegistryCredentials) <- registry, shared-rg
    apim-insights (insights:Component) <- shared-rg
    apim (apimanagement:ApiManagementService) <- shared-rg
    apim-insights-logger (apimanagement:Logger) <- apim, apim-insights, shared-rg
    orders (sql:Database) <- shared-rg, sql
    billing (sql:Database) <- shared-rg, sql
    outputs:
      ResourceGroupName = ${shared-rg.name}
      SqlServerName = ${sql.name}
      SqlServerFqdn = ${sql.fullyQualifiedDomainName}
      ContainerRegistryName = ${registry.name}
      ContainerRegistryLoginServer = ${registry.loginServer}
      ContainerRegistryUsername = ${registry-credentials.username}
      ContainerRegistryPassword = ${registry-credentials.password} [secret]
      ApiManagementName = ${apim.name}
      ApiManagementGatewayUrl = ${apim.gatewayUrl}
      ApiManagementPortalUrl = ${apim.portalUrl}
      ApiManagementInsightsName = ${apim-insights.name}
      ApiManagementInsightsInstrumentationKey = ${apim-insights.instrumentationKey} [secret]
      ApiManagementInsightsConnectionString = ${apim-insights.connectionString} [secret]
      DatabaseNames = ["orders","billing"]
    "###);
}

#[test]
fn app1_plan() {
    insta::assert_snapshot!(build(Unit::App1).outline(), @r###"
    resourcegroup (resources:ResourceGroup)
    app1-api-plan (web:AppServicePlan) <- resourcegroup
    app1-api-insights (insights:Component) <- resourcegroup
    app1-api (web:WebApp) <- app1-api-insights, app1-api-plan, resourcegroup
    app1store (storage:StorageAccount) <- resourcegroup
    app1fnstore (storage:StorageAccount) <- resourcegroup
    app1fnstore-keys (storage:listStorageAccountKeys) <- app1fnstore, resourcegroup
    app1-fn-plan (web:AppServicePlan) <- resourcegroup
    app1-fn-insights (insights:Component) <- resourcegroup
    app1-fn (web:WebApp) <- app1-fn-insights, app1-fn-plan, app1fnstore, app1fnstore-keys, resourcegroup
    app1-booking (eventgrid:Topic) <- resourcegroup
    app1-booking-keys (eventgrid:listTopicSharedAccessKeys) <- app1-booking, resourcegroup
    outputs:
      ResourceGroupName = ${resourcegroup.name}
      App1ApiUrl = ${app1-api.defaultHostName}
      App1ApiAppServiceName = ${app1-api.name}
      App1StorageAccountName = ${app1store.name}
      App1StorageAccountPrimaryEndpoint = ${app1store.primaryBlobEndpoint}
      App1FunctionUrl = ${app1-fn.defaultHostName}
      App1FunctionAppName = ${app1-fn.name}
      App1EventsTopicEndpoint = ${app1-booking.endpoint}
      App1EventsTopicKey = ${app1-booking-keys.key1} [secret]
    "###);
}

#[test]
fn app2_plan() {
    insta::assert_snapshot!(build(Unit::App2).outline(), @r###"
    resourcegroup (resources:ResourceGroup)
    app2-api-plan (web:AppServicePlan) <- resourcegroup
    app2-api-insights (insights:Component) <- resourcegroup
    app2-api (web:WebApp) <- app2-api-insights, app2-api-plan, resourcegroup
    app2fnstore (storage:StorageAccount) <- resourcegroup
    app2fnstore-keys (storage:listStorageAccountKeys) <- app2fnstore, resourcegroup
    app2-fn-plan (web:AppServicePlan) <- resourcegroup
    app2-fn-insights (insights:Component) <- resourcegroup
    app2-fn (web:WebApp) <- app2-fn-insights, app2-fn-plan, app2fnstore, app2fnstore-keys, resourcegroup
    outputs:
      ResourceGroupName = ${resourcegroup.name}
      App2ApiUrl = ${app2-api.defaultHostName}
      App2ApiAppServiceName = ${app2-api.name}
      App2FunctionUrl = ${app2-fn.defaultHostName}
      App2FunctionAppName = ${app2-fn.name}
    "###);
}

#[test]
fn app1_api_settings() {
    insta::assert_snapshot!(app_settings(&build(Unit::App1), "app1-api"), @r###"
    WEBSITE_RUN_FROM_PACKAGE = 0
    APPLICATIONINSIGHTS_CONNECTION_STRING = ${app1-api-insights.connectionString}
    DOCKER_REGISTRY_SERVER_URL = acmedevregistry.azurecr.io
    DOCKER_REGISTRY_SERVER_USERNAME = acmedevregistry
    DOCKER_REGISTRY_SERVER_PASSWORD = [secret]
    DisableHttpsRedirection = false
    AllowedHosts = *
    App1Events__BookingTopic = booking
    StorageSettings__Container = bookings
    Common__Mode = Prod
    Common__Retries = 3
    ServiceIconsOptions__Size = 64
    ServiceIconsOptions__Theme__Dark = true
    ApiKey = [secret]
    PrimaryBlobAccountKey = [secret]
    SecondaryBlobAccountKey = [secret]
    App1BlobAccountKey = [secret]
    App1EventsTopicKey = [secret]
    "###);
}

#[test]
fn app2_function_settings() {
    insta::assert_snapshot!(app_settings(&build(Unit::App2), "app2-fn"), @r###"
    AzureWebJobsStorage = ${app2fnstore.name, app2fnstore-keys.key1}
    FUNCTIONS_WORKER_RUNTIME = dotnet
    FUNCTIONS_EXTENSION_VERSION = ~4
    WEBSITE_RUN_FROM_PACKAGE = 0
    WEBSITES_ENABLE_APP_SERVICE_STORAGE = false
    AzureWebJobsSecretStorageType = files
    APPLICATIONINSIGHTS_CONNECTION_STRING = ${app2-fn-insights.connectionString}
    DOCKER_REGISTRY_SERVER_URL = acmedevregistry.azurecr.io
    DOCKER_REGISTRY_SERVER_USERNAME = acmedevregistry
    DOCKER_REGISTRY_SERVER_PASSWORD = [secret]
    Common:Mode = Prod
    ApiKey = [secret]
    PrimaryBlobAccountKey = [secret]
    SecondaryBlobAccountKey = [secret]
    App2FnStorageKey = [secret]
    PrimaryDataConnection = [secret]
    SecondaryDataConnection = [secret]
    "###);
}

#[test]
fn dry_run_resolves_every_output() {
    let stack = build(Unit::App1);
    let report = provision(&stack, &mut DryRunEngine::new());

    assert!(report.is_complete());
    assert_eq!(
        report.outputs["App1ApiUrl"],
        OutputValue::Value("https://acme-dev-app1-api.azurewebsites.net".into())
    );
    assert_eq!(
        report.outputs["App1EventsTopicEndpoint"],
        OutputValue::Value(
            "https://acme-dev-app1-booking.westeurope-1.eventgrid.azure.net/api/events".into()
        )
    );
    assert_eq!(report.outputs["App1EventsTopicKey"], OutputValue::Secret);
}

#[test]
fn failed_storage_only_takes_down_the_function_app() {
    let stack = build(Unit::App1);
    let mut engine = DryRunEngine::new().failing("app1fnstore");
    let report = provision(&stack, &mut engine);

    let failed: Vec<&str> = report
        .resources
        .iter()
        .filter(|(_, outcome)| matches!(outcome, Outcome::Failed(_)))
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(failed, vec!["app1fnstore", "app1fnstore-keys", "app1-fn"]);

    assert!(matches!(report.outputs["App1FunctionUrl"], OutputValue::Unavailable(_)));
    assert!(matches!(report.outputs["App1ApiUrl"], OutputValue::Value(_)));
    assert!(matches!(report.outputs["App1EventsTopicKey"], OutputValue::Secret));
    assert_eq!(engine.materializations("app1-fn"), 0);
    assert_eq!(engine.materializations("app1-booking-keys"), 1);
}
