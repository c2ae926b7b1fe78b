//! resource descriptors
//!
//! A [ResourceDescriptor] is the declarative form of one infrastructure object: a logical name
//! (unique per unit), a [Kind], a [PropertyBag] and the set of logical names it depends on.
//! Property values are literals, secrets or [Deferred] values; every resource a deferred value is
//! derived from is a dependency of the descriptor holding it.
use crate::deferred::{Deferred, PropertyRef};
use crate::secrets::Secret;
use crate::value::Value;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Kind {
    ResourceGroup,
    AppServicePlan,
    InsightsComponent,
    WebApp,
    StorageAccount,
    StorageAccountKeys,
    EventGridTopic,
    TopicAccessKeys,
    SqlServer,
    SqlFirewallRule,
    SqlDatabase,
    ContainerRegistry,
    RegistryCredentials,
    ApiManagementService,
    ApiManagementLogger,
}

impl Kind {
    /// Provider type token
    pub fn token(self) -> &'static str {
        match self {
            Kind::ResourceGroup => "resources:ResourceGroup",
            Kind::AppServicePlan => "web:AppServicePlan",
            Kind::InsightsComponent => "insights:Component",
            Kind::WebApp => "web:WebApp",
            Kind::StorageAccount => "storage:StorageAccount",
            Kind::StorageAccountKeys => "storage:listStorageAccountKeys",
            Kind::EventGridTopic => "eventgrid:Topic",
            Kind::TopicAccessKeys => "eventgrid:listTopicSharedAccessKeys",
            Kind::SqlServer => "sql:Server",
            Kind::SqlFirewallRule => "sql:FirewallRule",
            Kind::SqlDatabase => "sql:Database",
            Kind::ContainerRegistry => "containerregistry:Registry",
            Kind::RegistryCredentials => "containerregistry:listRegistryCredentials",
            Kind::ApiManagementService => "apimanagement:ApiManagementService",
            Kind::ApiManagementLogger => "apimanagement:Logger",
        }
    }

    /// Input property holding the physical name
    pub fn name_property(self) -> &'static str {
        match self {
            Kind::ResourceGroup => "resourceGroupName",
            Kind::AppServicePlan | Kind::WebApp => "name",
            Kind::InsightsComponent => "resourceName",
            Kind::StorageAccount | Kind::StorageAccountKeys => "accountName",
            Kind::EventGridTopic | Kind::TopicAccessKeys => "topicName",
            Kind::SqlServer => "serverName",
            Kind::SqlFirewallRule => "firewallRuleName",
            Kind::SqlDatabase => "databaseName",
            Kind::ContainerRegistry | Kind::RegistryCredentials => "registryName",
            Kind::ApiManagementService => "serviceName",
            Kind::ApiManagementLogger => "loggerId",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone)]
pub enum PropertyValue {
    Literal(Value),
    Secret(Secret),
    Deferred(Deferred),
    List(Vec<PropertyValue>),
    Map(IndexMap<String, PropertyValue>),
}

impl PropertyValue {
    /// A `{name, value}` pair as used for settings lists
    pub fn named(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        let mut pair = IndexMap::new();
        pair.insert("name".to_string(), PropertyValue::from(name.into()));
        pair.insert("value".to_string(), value.into());
        PropertyValue::Map(pair)
    }

    pub fn collect_references<'a>(&'a self, references: &mut BTreeSet<&'a str>) {
        match self {
            PropertyValue::Literal(_) | PropertyValue::Secret(_) => {}
            PropertyValue::Deferred(deferred) => references.extend(deferred.dependencies()),
            PropertyValue::List(list) => list
                .iter()
                .for_each(|element| element.collect_references(references)),
            PropertyValue::Map(map) => map
                .values()
                .for_each(|element| element.collect_references(references)),
        }
    }

    pub fn references(&self) -> BTreeSet<&str> {
        let mut references = BTreeSet::new();
        self.collect_references(&mut references);
        references
    }

    /// Whether any part of the value is sensitive
    pub fn is_secret(&self) -> bool {
        match self {
            PropertyValue::Literal(_) => false,
            PropertyValue::Secret(_) => true,
            PropertyValue::Deferred(deferred) => deferred.is_secret(),
            PropertyValue::List(list) => list.iter().any(PropertyValue::is_secret),
            PropertyValue::Map(map) => map.values().any(PropertyValue::is_secret),
        }
    }

    /// Replace every deferred value by its resolution
    pub fn resolve(
        &self,
        lookup: &dyn Fn(&PropertyRef) -> Option<String>,
    ) -> Result<Value, PropertyRef> {
        Ok(match self {
            PropertyValue::Literal(value) => value.clone(),
            PropertyValue::Secret(secret) => Value::from(secret.expose()),
            PropertyValue::Deferred(deferred) => Value::String(deferred.resolve(lookup)?),
            PropertyValue::List(list) => Value::Array(
                list.iter()
                    .map(|element| element.resolve(lookup))
                    .collect::<Result<_, _>>()?,
            ),
            PropertyValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, element)| {
                        element.resolve(lookup).map(|value| (key.clone(), value))
                    })
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

macro_rules! literal_from {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(value: $ty) -> Self {
                    PropertyValue::Literal(value.into())
                }
            }
        )+
    };
}

literal_from!(Value, String, &str, bool, i64, IndexMap<String, String>);

impl From<Secret> for PropertyValue {
    fn from(value: Secret) -> Self {
        PropertyValue::Secret(value)
    }
}

impl From<Deferred> for PropertyValue {
    fn from(value: Deferred) -> Self {
        PropertyValue::Deferred(value)
    }
}

impl From<PropertyBag> for PropertyValue {
    fn from(value: PropertyBag) -> Self {
        PropertyValue::Map(value.0)
    }
}

impl Serialize for PropertyValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PropertyValue::Literal(value) => value.serialize(serializer),
            PropertyValue::Secret(secret) => secret.serialize(serializer),
            PropertyValue::Deferred(deferred) => deferred.serialize(serializer),
            PropertyValue::List(list) => {
                let mut ser = serializer.serialize_seq(Some(list.len()))?;
                for element in list {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            PropertyValue::Map(map) => {
                let mut ser = serializer.serialize_map(Some(map.len()))?;
                for (key, element) in map {
                    ser.serialize_entry(key, element)?;
                }
                ser.end()
            }
        }
    }
}

/// Ordered input properties of a descriptor
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PropertyBag(IndexMap<String, PropertyValue>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    /// Logical names of every resource referenced by a deferred property
    pub fn references(&self) -> BTreeSet<&str> {
        let mut references = BTreeSet::new();
        for value in self.0.values() {
            value.collect_references(&mut references);
        }
        references
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceDescriptor {
    pub logical_name: String,
    pub kind: Kind,
    pub properties: PropertyBag,
    pub depends_on: BTreeSet<String>,
}

impl ResourceDescriptor {
    /// Physical name as configured in the name property of [Kind::name_property]
    pub fn physical_name(&self) -> Option<&Value> {
        match self.properties.get(self.kind.name_property())? {
            PropertyValue::Literal(value) => Some(value),
            _ => None,
        }
    }
}

/// Reference to an already declared descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    logical_name: String,
    kind: Kind,
}

impl ResourceHandle {
    pub(crate) fn new(logical_name: impl Into<String>, kind: Kind) -> Self {
        Self {
            logical_name: logical_name.into(),
            kind,
        }
    }

    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Deferred value of an exposed property
    pub fn output(&self, property: &str) -> Deferred {
        Deferred::property(self.logical_name.clone(), property)
    }

    pub fn name(&self) -> Deferred {
        self.output("name")
    }

    pub fn id(&self) -> Deferred {
        self.output("id")
    }
}
