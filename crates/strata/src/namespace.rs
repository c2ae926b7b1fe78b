//! named configuration namespaces
//!
//! A [Namespace] is the top-level mapping of one configuration source (the shared namespace,
//! a unit's local namespace or the secret namespace) together with the path it was loaded from.
//! Documents can be json, yaml or hcl. Stack files with a top-level `config` mapping are
//! supported as well: only keys of the form `<namespace>:<Key>` are picked up.
//!
//! All typed accessors report failures as [ConfigError] carrying the full field path.
use crate::config::ConfigError;
use crate::parse::{self, HclNode};
use crate::value::{Mapping, Value};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

pub type Source = Option<PathBuf>;

#[derive(Debug, Clone)]
pub struct Namespace {
    name: String,
    source: Source,
    values: Mapping,
}

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Hcl,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "hcl" => Some(Format::Hcl),
            _ => None,
        }
    }
}

impl Namespace {
    pub fn new(name: impl Into<String>, values: Mapping, source: impl Into<Source>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            values,
        }
    }

    /// Creates a namespace from a parsed document
    ///
    /// If the document is a stack file (has a `config` mapping) the keys belonging to `name`
    /// are extracted.
    pub fn from_value(
        name: impl Into<String>,
        value: Value,
        source: impl Into<Source>,
    ) -> Result<Self, LoadError> {
        let name = name.into();
        let Value::Object(mut values) = value else {
            return Err(LoadError::NotAMapping(name));
        };

        if let Some(Value::Object(stack_config)) = values.get("config") {
            let qualifier = format!("{name}:");
            values = stack_config
                .iter()
                .filter_map(|(key, value)| {
                    key.strip_prefix(&qualifier)
                        .map(|key| (key.to_string(), value.clone()))
                })
                .collect();
        }

        Ok(Self::new(name, values, source))
    }

    pub fn from_json(name: impl Into<String>, document: serde_json::Value) -> Result<Self, LoadError> {
        Self::from_value(name, parse::parse(document)?, None)
    }

    pub fn parse_str(
        name: impl Into<String>,
        input: &str,
        format: Format,
        source: impl Into<Source>,
    ) -> Result<Self, LoadError> {
        let value = match format {
            Format::Json => parse::parse(serde_json::from_str::<serde_json::Value>(input)?)?,
            Format::Yaml => parse::parse(serde_yaml::from_str::<serde_yaml::Value>(input)?)?,
            Format::Hcl => parse::parse(HclNode::from(hcl::parse(input)?))?,
        };
        Self::from_value(name, value, source)
    }

    pub fn load_file(name: impl Into<String>, file_path: &Path) -> Result<Self, LoadError> {
        let file_path = file_path.canonicalize()?;
        let name = name.into();
        tracing::info!(path=%file_path.display(), namespace=%name, "loading file");

        let format = Format::from_path(&file_path)
            .ok_or_else(|| LoadError::UnsupportedFormat(file_path.clone()))?;
        let file_contents = std::fs::read_to_string(&file_path)?;

        Self::parse_str(name, &file_contents, format, Some(file_path))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn values(&self) -> &Mapping {
        &self.values
    }

    /// Top level value; `null` counts as absent
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|value| !value.is_null())
    }

    /// The whole namespace as a [Section]
    pub fn root(&self) -> Section<'_> {
        Section {
            namespace: &self.name,
            path: None,
            values: &self.values,
        }
    }

    pub fn require(&self, key: &str) -> Result<&Value, ConfigError> {
        self.root().require(key)
    }

    pub fn require_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.root().require_str(key)
    }

    pub fn optional_str(&self, key: &str) -> Result<Option<&str>, ConfigError> {
        self.root().optional_str(key)
    }

    pub fn section(&self, key: &str) -> Result<Section<'_>, ConfigError> {
        self.root().section(key)
    }

    pub fn optional_section(&self, key: &str) -> Result<Option<Section<'_>>, ConfigError> {
        self.root().optional_section(key)
    }

    pub fn require_str_list(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        self.root().require_str_list(key)
    }
}

/// A mapping inside a [Namespace] that knows its own field path
#[derive(Debug, Clone)]
pub struct Section<'a> {
    namespace: &'a str,
    path: Option<String>,
    values: &'a Mapping,
}

impl<'a> Section<'a> {
    pub fn namespace(&self) -> &'a str {
        self.namespace
    }

    pub fn values(&self) -> &'a Mapping {
        self.values
    }

    /// Full path of a field inside this section
    pub fn field_path(&self, key: &str) -> String {
        match &self.path {
            Some(path) => format!("{path}.{key}"),
            None => key.to_string(),
        }
    }

    pub fn missing(&self, key: &str) -> ConfigError {
        ConfigError::missing(self.namespace, self.field_path(key))
    }

    fn mismatch(&self, key: &str, expected: &'static str, found: &Value) -> ConfigError {
        ConfigError::mismatch(self.namespace, self.field_path(key), expected, found.kind())
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.values.get(key).filter(|value| !value.is_null())
    }

    pub fn require(&self, key: &str) -> Result<&'a Value, ConfigError> {
        self.get(key).ok_or_else(|| self.missing(key))
    }

    pub fn require_str(&self, key: &str) -> Result<&'a str, ConfigError> {
        let value = self.require(key)?;
        value
            .as_str()
            .ok_or_else(|| self.mismatch(key, "a string", value))
    }

    pub fn optional_str(&self, key: &str) -> Result<Option<&'a str>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(other) => Err(self.mismatch(key, "a string", other)),
        }
    }

    /// A boolean, also accepted in its string form (`"true"`, `"False"`, ...)
    pub fn require_bool(&self, key: &str) -> Result<bool, ConfigError> {
        match self.require(key)? {
            Value::Boolean(value) => Ok(*value),
            Value::String(value) if value.eq_ignore_ascii_case("true") => Ok(true),
            Value::String(value) if value.eq_ignore_ascii_case("false") => Ok(false),
            other => Err(self.mismatch(key, "a boolean", other)),
        }
    }

    /// An integer, also accepted in its string form (`"2"`)
    pub fn require_integer(&self, key: &str) -> Result<i64, ConfigError> {
        match self.require(key)? {
            Value::Integer(value) => Ok(*value),
            Value::String(value) => value
                .trim()
                .parse()
                .map_err(|_| self.mismatch(key, "an integer", &Value::String(value.clone()))),
            other => Err(self.mismatch(key, "an integer", other)),
        }
    }

    pub fn section(&self, key: &str) -> Result<Section<'a>, ConfigError> {
        self.optional_section(key)?
            .ok_or_else(|| self.missing(key))
    }

    pub fn optional_section(&self, key: &str) -> Result<Option<Section<'a>>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(values)) => Ok(Some(Section {
                namespace: self.namespace,
                path: Some(self.field_path(key)),
                values,
            })),
            Some(other) => Err(self.mismatch(key, "a mapping", other)),
        }
    }

    pub fn require_str_list(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        let value = self.require(key)?;
        let array = value
            .as_array()
            .ok_or_else(|| self.mismatch(key, "a list of strings", value))?;

        array
            .iter()
            .enumerate()
            .map(|(index, element)| {
                element.as_str().map(str::to_string).ok_or_else(|| {
                    self.mismatch(&format!("{key}[{index}]"), "a string", element)
                })
            })
            .collect()
    }

    /// Every entry of this section as a string
    pub fn to_str_map(&self) -> Result<IndexMap<String, String>, ConfigError> {
        self.values
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => Ok((key.clone(), s.clone())),
                other => Err(self.mismatch(key, "a string", other)),
            })
            .collect()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse json document")]
    JsonParseFailed(#[from] serde_json::Error),
    #[error("Unable to parse yaml document")]
    YamlParseFailed(#[from] serde_yaml::Error),
    #[error("Unable to parse hcl document")]
    HclParseFailed(#[from] hcl::Error),
    #[error(transparent)]
    Malformed(#[from] parse::ParseError),
    #[error("Unsupported document format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("Root of namespace `{0}` must be a mapping")]
    NotAMapping(String),
}

/// Utility macro to create a [Namespace] from inline json
///
/// ```
/// # use strata::namespace;
/// let shared = namespace!("SharedResources" => {"Location": "westeurope"});
/// assert_eq!(shared.require_str("Location").unwrap(), "westeurope");
/// ```
///
/// # Panic
/// Panics on documents that are not a mapping
///
/// ```should_panic
/// # use strata::namespace;
/// namespace!("SharedResources" => ["not", "a", "mapping"]);
/// ```
#[macro_export]
macro_rules! namespace {
    { $name:expr => $($json:tt)+ } => {
        $crate::namespace::Namespace::from_json($name, ::serde_json::json!($($json)+))
            .expect("namespace must be a mapping")
    };
}
