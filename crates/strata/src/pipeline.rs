//! dependency-ordered resource composition
//!
//! A [StackBuilder] records descriptors in the order they are declared. A descriptor may only
//! reference resources that were declared before it; the declaration order is therefore always
//! a valid topological order of the dependency graph.
//!
//! The dependency set of every descriptor is computed from the deferred values in its property
//! bag, plus any explicit dependencies passed to [StackBuilder::declare_with].
use crate::deferred::Deferred;
use crate::descriptor::{Kind, PropertyBag, PropertyValue, ResourceDescriptor, ResourceHandle};
use indexmap::IndexMap;
use std::collections::BTreeSet;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("`{descriptor}` references `{reference}` which has not been declared before it")]
    UndeclaredReference {
        descriptor: String,
        reference: String,
    },
    #[error("Logical name `{0}` is declared more than once")]
    DuplicateLogicalName(String),
}

#[derive(Debug)]
pub struct StackBuilder {
    unit: String,
    descriptors: IndexMap<String, ResourceDescriptor>,
    outputs: IndexMap<String, PropertyValue>,
}

impl StackBuilder {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            descriptors: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn declare(
        &mut self,
        logical_name: impl Into<String>,
        kind: Kind,
        properties: PropertyBag,
    ) -> Result<ResourceHandle, PipelineError> {
        self.declare_with(logical_name, kind, properties, &[])
    }

    /// Declare a descriptor with dependencies that are not visible in its properties
    pub fn declare_with(
        &mut self,
        logical_name: impl Into<String>,
        kind: Kind,
        properties: PropertyBag,
        explicit: &[&ResourceHandle],
    ) -> Result<ResourceHandle, PipelineError> {
        let logical_name = logical_name.into();
        if self.descriptors.contains_key(&logical_name) {
            return Err(PipelineError::DuplicateLogicalName(logical_name));
        }

        let mut depends_on = BTreeSet::new();
        let referenced = properties
            .references()
            .into_iter()
            .chain(explicit.iter().map(|handle| handle.logical_name()));
        for reference in referenced {
            self.check_declared(&logical_name, reference)?;
            depends_on.insert(reference.to_string());
        }

        tracing::debug!(unit=%self.unit, %logical_name, %kind, ?depends_on, "declared");
        self.descriptors.insert(
            logical_name.clone(),
            ResourceDescriptor {
                logical_name: logical_name.clone(),
                kind,
                properties,
                depends_on,
            },
        );

        Ok(ResourceHandle::new(logical_name, kind))
    }

    /// Add a named output of the unit
    pub fn export(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        let value = value.into();
        for reference in value.references() {
            self.check_declared(&name, reference)?;
        }
        self.outputs.insert(name, value);
        Ok(())
    }

    fn check_declared(&self, referrer: &str, reference: &str) -> Result<(), PipelineError> {
        if self.descriptors.contains_key(reference) {
            Ok(())
        } else {
            Err(PipelineError::UndeclaredReference {
                descriptor: referrer.to_string(),
                reference: reference.to_string(),
            })
        }
    }

    pub fn finish(self) -> Stack {
        tracing::info!(
            unit=%self.unit,
            descriptors = self.descriptors.len(),
            outputs = self.outputs.len(),
            "unit composed"
        );
        Stack {
            unit: self.unit,
            descriptors: self.descriptors.into_values().collect(),
            outputs: self.outputs,
        }
    }
}

/// Ordered descriptors and named outputs of one deployable unit
#[derive(Debug, Clone, serde::Serialize)]
pub struct Stack {
    pub unit: String,
    pub descriptors: Vec<ResourceDescriptor>,
    pub outputs: IndexMap<String, PropertyValue>,
}

impl Stack {
    pub fn descriptor(&self, logical_name: &str) -> Option<&ResourceDescriptor> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.logical_name == logical_name)
    }

    /// Declaration order, kinds, dependencies and outputs; one line each
    pub fn outline(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for descriptor in &self.descriptors {
            write!(f, "{} ({})", descriptor.logical_name, descriptor.kind)?;
            if !descriptor.depends_on.is_empty() {
                let depends_on: Vec<&str> =
                    descriptor.depends_on.iter().map(String::as_str).collect();
                write!(f, " <- {}", depends_on.join(", "))?;
            }
            writeln!(f)?;
        }

        f.write_str("outputs:")?;
        for (name, value) in &self.outputs {
            write!(f, "\n  {name} = {}", render_output(value))?;
        }
        Ok(())
    }
}

fn render_output(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Literal(value) => value.render(),
        PropertyValue::Secret(secret) => secret.to_string(),
        PropertyValue::Deferred(deferred) if deferred.is_secret() => format!("{deferred} [secret]"),
        PropertyValue::Deferred(deferred) => deferred.to_string(),
        PropertyValue::List(list) => {
            let elements: Vec<String> = list.iter().map(render_output).collect();
            format!("[{}]", elements.join(", "))
        }
        PropertyValue::Map(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{key}: {}", render_output(value)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

/// `https://` prefixed host name of a web app
pub fn https_url(host_name: Deferred) -> Deferred {
    host_name.map(|host| format!("https://{host}"))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dependencies_follow_references() {
        let mut stack = StackBuilder::new("test");
        let rg = stack
            .declare("rg", Kind::ResourceGroup, PropertyBag::new().with("resourceGroupName", "acme-dev-rg"))
            .unwrap();
        let plan = stack
            .declare(
                "plan",
                Kind::AppServicePlan,
                PropertyBag::new().with("resourceGroupName", rg.name()),
            )
            .unwrap();
        stack
            .declare(
                "compute",
                Kind::WebApp,
                PropertyBag::new()
                    .with("resourceGroupName", rg.name())
                    .with("serverFarmId", plan.id()),
            )
            .unwrap();

        let stack = stack.finish();
        let compute = stack.descriptor("compute").unwrap();
        assert_eq!(
            compute.depends_on.iter().collect::<Vec<_>>(),
            vec!["plan", "rg"]
        );
    }

    #[test]
    fn reference_to_later_step_is_rejected() {
        let mut stack = StackBuilder::new("test");
        stack
            .declare("rg", Kind::ResourceGroup, PropertyBag::new())
            .unwrap();

        let not_yet_built = Deferred::property("plan", "id");
        let error = stack
            .declare(
                "compute",
                Kind::WebApp,
                PropertyBag::new().with("serverFarmId", not_yet_built),
            )
            .unwrap_err();
        assert_eq!(
            error,
            PipelineError::UndeclaredReference {
                descriptor: "compute".into(),
                reference: "plan".into()
            }
        );
        assert!(stack.finish().descriptor("compute").is_none());
    }

    #[test]
    fn explicit_dependencies() {
        let mut stack = StackBuilder::new("test");
        let apim = stack
            .declare("apim", Kind::ApiManagementService, PropertyBag::new())
            .unwrap();
        let insights = stack
            .declare("insights", Kind::InsightsComponent, PropertyBag::new())
            .unwrap();
        stack
            .declare_with(
                "logger",
                Kind::ApiManagementLogger,
                PropertyBag::new(),
                &[&apim, &insights],
            )
            .unwrap();
        let stack = stack.finish();
        assert_eq!(stack.descriptor("logger").unwrap().depends_on.len(), 2);
    }

    #[test]
    fn duplicate_logical_name() {
        let mut stack = StackBuilder::new("test");
        stack
            .declare("rg", Kind::ResourceGroup, PropertyBag::new())
            .unwrap();
        assert_eq!(
            stack
                .declare("rg", Kind::ResourceGroup, PropertyBag::new())
                .unwrap_err(),
            PipelineError::DuplicateLogicalName("rg".into())
        );
    }

    #[test]
    fn outputs_must_reference_declared_resources() {
        let mut stack = StackBuilder::new("test");
        let api = stack
            .declare("api", Kind::WebApp, PropertyBag::new())
            .unwrap();
        stack
            .export("ApiUrl", https_url(api.output("defaultHostName")))
            .unwrap();
        assert!(stack
            .export("FunctionUrl", Deferred::property("fn", "defaultHostName"))
            .is_err());

        assert_eq!(
            stack.finish().outline(),
            "api (web:WebApp)\noutputs:\n  ApiUrl = ${api.defaultHostName}"
        );
    }

    #[test]
    fn display_lists_dependencies() {
        let mut stack = StackBuilder::new("test");
        let rg = stack
            .declare("rg", Kind::ResourceGroup, PropertyBag::new())
            .unwrap();
        stack
            .declare("plan", Kind::AppServicePlan, PropertyBag::new().with("resourceGroupName", rg.name()))
            .unwrap();
        let stack = stack.finish();

        assert_eq!(
            format!("{stack}"),
            format!(
                "rg ({})\nplan ({}) <- rg\noutputs:",
                Kind::ResourceGroup,
                Kind::AppServicePlan
            )
        );
        assert_eq!(stack.outline(), stack.to_string());
    }
}
