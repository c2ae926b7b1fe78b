//! app settings assembly
//!
//! Settings of a web or function app are an ordered list of `{name, value}` pairs. They are
//! assembled in four stages:
//!
//! 1. platform defaults (run-from-package flag, runtime versions, telemetry connection)
//! 2. registry credentials
//! 3. recognized scalars and setting groups of the unit's configuration, flattened with the
//!    unit's separator
//! 4. secrets and connection strings, always last
//!
//! Setting groups that are not recognized, and recognized groups that are not a mapping, are
//! dropped with a warning.
use crate::config::RegistrySettings;
use crate::descriptor::PropertyValue;
use crate::flatten::flatten_with_prefix;
use crate::secrets::SecretHandleSet;
use crate::value::{Mapping, Value};

#[derive(Debug)]
pub struct SettingsBuilder<'a> {
    separator: &'a str,
    settings: Vec<(String, PropertyValue)>,
}

impl<'a> SettingsBuilder<'a> {
    pub fn new(separator: &'a str) -> Self {
        Self {
            separator,
            settings: vec![],
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> &mut Self {
        self.settings.push((name.into(), value.into()));
        self
    }

    pub fn registry_credentials(&mut self, registry: &RegistrySettings) -> &mut Self {
        self.push("DOCKER_REGISTRY_SERVER_URL", registry.url.as_str())
            .push("DOCKER_REGISTRY_SERVER_USERNAME", registry.username.as_str())
            .push("DOCKER_REGISTRY_SERVER_PASSWORD", registry.password.clone())
    }

    /// Copy top-level scalars of `section`; absent keys are skipped
    pub fn scalars(&mut self, section: &Mapping, keys: &[&str]) -> &mut Self {
        for key in keys {
            match section.get(*key) {
                None | Some(Value::Object(_)) => {}
                Some(value) => {
                    self.push(*key, value.render());
                }
            }
        }
        self
    }

    /// Copy a scalar nested inside a group under its own name
    ///
    /// Overrides an earlier setting of the same name in place.
    pub fn nested_scalar(&mut self, section: &Mapping, group: &str, key: &str) -> &mut Self {
        let value = section
            .get(group)
            .and_then(Value::as_object)
            .and_then(|group| group.get(key));
        let Some(value) = value.filter(|value| value.as_object().is_none()) else {
            return self;
        };

        match self.settings.iter_mut().find(|(name, _)| name.as_str() == key) {
            Some((_, existing)) => *existing = PropertyValue::from(value.render()),
            None => {
                self.push(key, value.render());
            }
        }
        self
    }

    /// Flatten the recognized `groups` of `section` under their own name
    ///
    /// Object entries of `section` that are neither a recognized group nor listed in `known`
    /// are dropped.
    pub fn groups(&mut self, section: &Mapping, groups: &[&str], known: &[&str]) -> &mut Self {
        for group in groups {
            match section.get(*group) {
                None => {}
                Some(Value::Object(values)) => {
                    for setting in flatten_with_prefix(Some(*group), values, self.separator) {
                        self.settings
                            .push((setting.key, PropertyValue::from(setting.value)));
                    }
                }
                Some(other) => {
                    tracing::warn!(
                        group = *group,
                        kind = other.kind(),
                        "setting group is not a mapping, dropped"
                    );
                }
            }
        }

        for (key, value) in section {
            let recognized = groups.contains(&key.as_str()) || known.contains(&key.as_str());
            if matches!(value, Value::Object(_)) && !recognized {
                tracing::warn!(group=%key, "unrecognized setting group dropped");
            }
        }
        self
    }

    /// Append secrets as `(setting name, secret name)` pairs
    pub fn secrets(
        &mut self,
        handles: &SecretHandleSet,
        names: &[(&str, &str)],
    ) -> Result<&mut Self, crate::secrets::SecretError> {
        for (setting, secret) in names {
            self.push(*setting, handles.get(secret)?.clone());
        }
        Ok(self)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.settings.iter().map(|(name, _)| name.as_str())
    }

    pub fn build(self) -> PropertyValue {
        PropertyValue::List(
            self.settings
                .into_iter()
                .map(|(name, value)| PropertyValue::named(name, value))
                .collect(),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::secrets::{MemorySecretStore, Secret, SecretPolicy, SecretResolver};
    use pretty_assertions::assert_eq;

    fn api_settings() -> Mapping {
        crate::namespace!("App1Infrastructure" => {
            "HealthCheck": "/api/health",
            "DisableHttpsRedirection": false,
            "AllowedHosts": "*",
            "Common": {"Mode": "Prod", "Retries": 3},
            "Unknown": {"Dropped": true},
            "ServiceIconsOptions": {"Size": 64}
        })
        .values()
        .clone()
    }

    #[test]
    fn stages_in_order() {
        let section = api_settings();
        let registry = RegistrySettings {
            url: "acmedevregistry.azurecr.io".into(),
            username: "acmedevregistry".into(),
            password: Secret::new("pw"),
        };
        let store = MemorySecretStore::new("secrets").with("ApiKey", "k");
        let handles = SecretResolver::new(&store, SecretPolicy::Strict)
            .bind(["ApiKey"])
            .unwrap();

        let mut settings = SettingsBuilder::new("__");
        settings
            .push("WEBSITE_RUN_FROM_PACKAGE", "0")
            .registry_credentials(&registry)
            .scalars(&section, &["DisableHttpsRedirection", "AllowedHosts", "Missing"])
            .groups(&section, &["App1Events", "Common", "ServiceIconsOptions"], &[]);
        settings.secrets(&handles, &[("ApiKey", "ApiKey")]).unwrap();

        assert_eq!(
            settings.names().collect::<Vec<_>>(),
            vec![
                "WEBSITE_RUN_FROM_PACKAGE",
                "DOCKER_REGISTRY_SERVER_URL",
                "DOCKER_REGISTRY_SERVER_USERNAME",
                "DOCKER_REGISTRY_SERVER_PASSWORD",
                "DisableHttpsRedirection",
                "AllowedHosts",
                "Common__Mode",
                "Common__Retries",
                "ServiceIconsOptions__Size",
                "ApiKey",
            ]
        );

        let built = serde_json::to_value(settings.build()).unwrap();
        assert_eq!(built[3]["value"], "[secret]");
        assert_eq!(built[4]["value"], "false");
        assert_eq!(built[7]["value"], "3");
    }

    #[test]
    fn groups_use_the_separator() {
        let section = api_settings();
        let mut settings = SettingsBuilder::new(":");
        settings.groups(&section, &["Common"], &[]);
        assert_eq!(
            settings.names().collect::<Vec<_>>(),
            vec!["Common:Mode", "Common:Retries"]
        );
    }

    #[test]
    fn scalar_valued_group_is_dropped() {
        let section = crate::namespace!("App1Infrastructure" => {
            "Common": "Prod",
            "StorageSettings": ["a", "b"],
            "ServiceIconsOptions": {"Size": 64}
        })
        .values()
        .clone();
        let mut settings = SettingsBuilder::new("__");
        settings.groups(&section, &["Common", "StorageSettings", "ServiceIconsOptions"], &[]);
        assert_eq!(
            settings.names().collect::<Vec<_>>(),
            vec!["ServiceIconsOptions__Size"]
        );
    }

    #[test]
    fn nested_scalar_is_copied_under_its_own_name() {
        let section = crate::namespace!("Fn" => {"Values": {"FUNCTIONS_WORKER_RUNTIME": "dotnet-isolated"}})
            .values()
            .clone();
        let mut settings = SettingsBuilder::new("__");
        settings
            .nested_scalar(&section, "Values", "FUNCTIONS_WORKER_RUNTIME")
            .nested_scalar(&section, "Values", "Missing");
        let built = serde_json::to_value(settings.build()).unwrap();
        assert_eq!(
            built,
            serde_json::json!([{"name": "FUNCTIONS_WORKER_RUNTIME", "value": "dotnet-isolated"}])
        );

        let mut settings = SettingsBuilder::new("__");
        settings
            .push("FUNCTIONS_WORKER_RUNTIME", "dotnet")
            .push("FUNCTIONS_EXTENSION_VERSION", "~4")
            .nested_scalar(&section, "Values", "FUNCTIONS_WORKER_RUNTIME");
        let built = serde_json::to_value(settings.build()).unwrap();
        assert_eq!(
            built,
            serde_json::json!([
                {"name": "FUNCTIONS_WORKER_RUNTIME", "value": "dotnet-isolated"},
                {"name": "FUNCTIONS_EXTENSION_VERSION", "value": "~4"}
            ])
        );
    }

    #[test]
    fn missing_secret_handle() {
        let mut settings = SettingsBuilder::new("__");
        assert!(settings
            .secrets(&SecretHandleSet::default(), &[("ApiKey", "ApiKey")])
            .is_err());
    }
}
