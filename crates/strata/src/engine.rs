//! provisioning boundary
//!
//! A [ProvisioningEngine] materializes one descriptor at a time from its resolved inputs and
//! returns the properties the resource exposes. [provision] walks a [Stack] in declaration order
//! and applies the failure policy:
//!
//! - a descriptor whose engine call fails is marked failed
//! - every descriptor depending on a failed one fails with
//!   [ResolutionError::DependencyResolutionFailure] and is never handed to the engine
//! - descriptors and outputs that do not depend on a failed descriptor resolve normally
//!
//! Each logical name is materialized at most once per run.
use crate::deferred::PropertyRef;
use crate::descriptor::{Kind, PropertyValue, ResourceDescriptor};
use crate::pipeline::Stack;
use crate::value::{Mapping, Value};
use indexmap::IndexMap;
use std::collections::BTreeSet;

pub trait ProvisioningEngine {
    /// Create the resource; returns its exposed properties or the reason it failed
    fn materialize(
        &mut self,
        descriptor: &ResourceDescriptor,
        inputs: &Mapping,
    ) -> Result<IndexMap<String, String>, String>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum ResolutionError {
    #[error("`{descriptor}` could not be resolved: {reason}")]
    DependencyResolutionFailure { descriptor: String, reason: String },
}

impl ResolutionError {
    fn new(descriptor: impl Into<String>, reason: impl Into<String>) -> Self {
        ResolutionError::DependencyResolutionFailure {
            descriptor: descriptor.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Materialized(IndexMap<String, String>),
    Failed(ResolutionError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    Value(Value),
    /// Resolved, but sensitive
    Secret,
    Unavailable(ResolutionError),
}

impl serde::Serialize for OutputValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OutputValue::Value(value) => value.serialize(serializer),
            OutputValue::Secret => serializer.serialize_str("[secret]"),
            OutputValue::Unavailable(error) => serializer.collect_str(&format_args!("<{error}>")),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Report {
    pub unit: String,
    pub resources: IndexMap<String, Outcome>,
    pub outputs: IndexMap<String, OutputValue>,
}

impl Report {
    pub fn outcome(&self, logical_name: &str) -> Option<&Outcome> {
        self.resources.get(logical_name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ResolutionError> {
        self.resources.values().filter_map(|outcome| match outcome {
            Outcome::Failed(error) => Some(error),
            Outcome::Materialized(_) => None,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

pub fn provision(stack: &Stack, engine: &mut dyn ProvisioningEngine) -> Report {
    let mut resources: IndexMap<String, Outcome> = IndexMap::new();

    for descriptor in &stack.descriptors {
        let name = &descriptor.logical_name;
        if resources.contains_key(name) {
            tracing::debug!(%name, "already materialized");
            continue;
        }

        let outcome = match unavailable_dependency(&descriptor.depends_on, &resources) {
            Some(dependency) => Outcome::Failed(ResolutionError::new(
                name,
                format!("dependency `{dependency}` failed"),
            )),
            None => match resolve_inputs(descriptor, &resources) {
                Err(error) => Outcome::Failed(error),
                Ok(inputs) => match engine.materialize(descriptor, &inputs) {
                    Ok(properties) => Outcome::Materialized(properties),
                    Err(reason) => Outcome::Failed(ResolutionError::new(name, reason)),
                },
            },
        };

        match &outcome {
            Outcome::Materialized(_) => tracing::info!(unit=%stack.unit, %name, "materialized"),
            Outcome::Failed(error) => tracing::warn!(unit=%stack.unit, %name, %error, "failed"),
        }
        resources.insert(name.clone(), outcome);
    }

    let outputs = stack
        .outputs
        .iter()
        .map(|(name, value)| (name.clone(), resolve_output(name, value, &resources)))
        .collect();

    Report {
        unit: stack.unit.clone(),
        resources,
        outputs,
    }
}

fn unavailable_dependency<'a>(
    depends_on: &'a BTreeSet<String>,
    resources: &IndexMap<String, Outcome>,
) -> Option<&'a str> {
    depends_on
        .iter()
        .find(|dependency| !matches!(resources.get(*dependency), Some(Outcome::Materialized(_))))
        .map(String::as_str)
}

fn lookup<'r>(resources: &'r IndexMap<String, Outcome>) -> impl Fn(&PropertyRef) -> Option<String> + 'r {
    move |source: &PropertyRef| match resources.get(&source.resource) {
        Some(Outcome::Materialized(properties)) => properties.get(&source.property).cloned(),
        _ => None,
    }
}

fn resolve_inputs(
    descriptor: &ResourceDescriptor,
    resources: &IndexMap<String, Outcome>,
) -> Result<Mapping, ResolutionError> {
    let lookup = lookup(resources);
    descriptor
        .properties
        .iter()
        .map(|(key, value)| {
            value
                .resolve(&lookup)
                .map(|value| (key.clone(), value))
                .map_err(|source| {
                    ResolutionError::new(&descriptor.logical_name, format!("`{source}` is not available"))
                })
        })
        .collect()
}

fn resolve_output(
    name: &str,
    value: &PropertyValue,
    resources: &IndexMap<String, Outcome>,
) -> OutputValue {
    match value.resolve(&lookup(resources)) {
        Ok(_) if value.is_secret() => OutputValue::Secret,
        Ok(value) => OutputValue::Value(value),
        Err(source) => OutputValue::Unavailable(ResolutionError::new(
            name,
            format!("`{source}` is not available"),
        )),
    }
}

/// Engine that creates nothing and synthesizes plausible exposed properties
#[derive(Debug, Default)]
pub struct DryRunEngine {
    fail: BTreeSet<String>,
    materialized: IndexMap<String, usize>,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the materialization of `logical_name` fail
    pub fn failing(mut self, logical_name: impl Into<String>) -> Self {
        self.fail.insert(logical_name.into());
        self
    }

    /// How often `logical_name` was handed to the engine
    pub fn materializations(&self, logical_name: &str) -> usize {
        self.materialized.get(logical_name).copied().unwrap_or_default()
    }
}

impl ProvisioningEngine for DryRunEngine {
    fn materialize(
        &mut self,
        descriptor: &ResourceDescriptor,
        inputs: &Mapping,
    ) -> Result<IndexMap<String, String>, String> {
        *self
            .materialized
            .entry(descriptor.logical_name.clone())
            .or_default() += 1;

        if self.fail.contains(&descriptor.logical_name) {
            return Err("injected failure".into());
        }
        Ok(synthesize(descriptor, inputs))
    }
}

fn synthesize(descriptor: &ResourceDescriptor, inputs: &Mapping) -> IndexMap<String, String> {
    let input = |key: &str| inputs.get(key).map(Value::render);
    let name = input(descriptor.kind.name_property()).unwrap_or_else(|| descriptor.logical_name.clone());
    let location = input("location").unwrap_or_default();
    let resource_group = input("resourceGroupName").unwrap_or_else(|| name.clone());

    let mut properties = IndexMap::new();
    let id = match descriptor.kind {
        Kind::ResourceGroup => format!("/subscriptions/dry-run/resourceGroups/{name}"),
        kind => format!("/subscriptions/dry-run/resourceGroups/{resource_group}/providers/{kind}/{name}"),
    };
    properties.insert("id".to_string(), id);
    properties.insert("name".to_string(), name.clone());
    properties.insert("location".to_string(), location.clone());

    let exposed: Vec<(&str, String)> = match descriptor.kind {
        Kind::WebApp => vec![("defaultHostName", format!("{name}.azurewebsites.net"))],
        Kind::StorageAccount => vec![(
            "primaryBlobEndpoint",
            format!("https://{name}.blob.core.windows.net/"),
        )],
        Kind::StorageAccountKeys | Kind::TopicAccessKeys => {
            vec![("key1", format!("dry-run-key1-{name}"))]
        }
        Kind::EventGridTopic => vec![(
            "endpoint",
            format!("https://{name}.{location}-1.eventgrid.azure.net/api/events"),
        )],
        Kind::SqlServer => vec![(
            "fullyQualifiedDomainName",
            format!("{name}.database.windows.net"),
        )],
        Kind::ContainerRegistry => vec![("loginServer", format!("{name}.azurecr.io"))],
        Kind::RegistryCredentials => vec![
            ("username", name.clone()),
            ("password", format!("dry-run-password-{name}")),
        ],
        Kind::ApiManagementService => vec![
            ("gatewayUrl", format!("https://{name}.azure-api.net")),
            ("portalUrl", format!("https://{name}.developer.azure-api.net")),
        ],
        Kind::InsightsComponent => vec![
            ("instrumentationKey", format!("dry-run-ikey-{name}")),
            (
                "connectionString",
                format!("InstrumentationKey=dry-run-ikey-{name}"),
            ),
        ],
        Kind::ResourceGroup
        | Kind::AppServicePlan
        | Kind::SqlFirewallRule
        | Kind::SqlDatabase
        | Kind::ApiManagementLogger => vec![],
    };
    properties.extend(exposed.into_iter().map(|(key, value)| (key.to_string(), value)));
    properties
}
