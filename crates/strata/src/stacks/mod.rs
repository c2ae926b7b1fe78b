//! deployable units
//!
//! Each unit is a fixed, hand-ordered sequence of build steps over one configuration snapshot.
//! A step may only reference resources declared by an earlier step.
pub mod app1;
pub mod app2;
pub mod shared;
pub mod steps;

pub use crate::error::BuildError;

use crate::namespace::Namespace;
use crate::pipeline::Stack;
use crate::secrets::SecretStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Shared,
    App1,
    App2,
}

impl Unit {
    /// Namespace holding the unit's own configuration
    pub fn namespace(self) -> &'static str {
        match self {
            Unit::Shared => shared::UNIT,
            Unit::App1 => app1::PROFILE.namespace,
            Unit::App2 => app2::PROFILE.namespace,
        }
    }

    /// Build the descriptors and outputs of the unit
    ///
    /// `local` is not read by the shared unit.
    pub fn build(
        self,
        shared: &Namespace,
        local: &Namespace,
        store: &dyn SecretStore,
    ) -> Result<Stack, BuildError> {
        tracing::info!(unit = self.namespace(), store = store.name(), "building unit");
        match self {
            Unit::Shared => shared::build(shared, store),
            Unit::App1 => app1::build(shared, local, store),
            Unit::App2 => app2::build(shared, local, store),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    use crate::config::UnitProfile;
    use crate::namespace::{Format, Namespace};
    use crate::secrets::MemorySecretStore;

    pub const STACK: &str = include_str!("../../tests/fixtures/stack.yaml");

    pub fn namespace(name: &str) -> Namespace {
        Namespace::parse_str(name, STACK, Format::Yaml, None).unwrap()
    }

    /// Shared and local namespace of `profile`, secrets are read from the local namespace
    pub fn namespaces(profile: &UnitProfile) -> (Namespace, Namespace, MemorySecretStore) {
        let local = namespace(profile.namespace);
        let secrets = MemorySecretStore::from_namespace(&local);
        (namespace(super::shared::UNIT), local, secrets)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::secrets::MemorySecretStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_unit_builds_from_one_stack_file() {
        let shared = fixture::namespace(Unit::Shared.namespace());
        let shared_secrets = MemorySecretStore::from_namespace(&shared);
        let stack = Unit::Shared.build(&shared, &shared, &shared_secrets).unwrap();
        assert_eq!(stack.unit, "SharedResources");
        assert_eq!(stack.descriptors.len(), 10);

        for unit in [Unit::App1, Unit::App2] {
            let local = fixture::namespace(unit.namespace());
            let secrets = MemorySecretStore::from_namespace(&local);
            let stack = unit.build(&shared, &local, &secrets).unwrap();
            assert_eq!(stack.unit, unit.namespace());
            assert_eq!(stack.descriptors[0].logical_name, "resourcegroup");
        }
    }

    #[test]
    fn missing_local_namespace_reports_its_fields() {
        let shared = fixture::namespace(Unit::Shared.namespace());
        let empty = fixture::namespace("App3Infrastructure");
        let error = Unit::App1
            .build(&shared, &empty, &MemorySecretStore::new("empty"))
            .unwrap_err();
        assert!(error
            .config_issues()
            .contains(&&crate::config::ConfigError::missing("App3Infrastructure", "ResourcesNames")));
    }
}
