//! deferred values
//!
//! A [Deferred] is a value that is only known once the resources it was derived from have been
//! materialized. It records every [PropertyRef] it was built from, so the resources it depends
//! on can always be read off the value itself.
//!
//! There are only two combinators:
//! - [Deferred::map] derives a value from a single deferred value
//! - [Deferred::zip] combines several deferred values into one
use std::ops::Range;
use std::sync::Arc;

/// An exposed property of a declared resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_new::new)]
pub struct PropertyRef {
    pub resource: String,
    pub property: String,
}

impl std::fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource, self.property)
    }
}

type Combine = Arc<dyn Fn(&[String]) -> String + Send + Sync>;

#[derive(Clone)]
pub struct Deferred {
    sources: Vec<PropertyRef>,
    combine: Combine,
    secret: bool,
}

impl Deferred {
    /// The raw value of one exposed property
    pub fn property(resource: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            sources: vec![PropertyRef::new(resource.into(), property.into())],
            combine: Arc::new(|values: &[String]| values.first().cloned().unwrap_or_default()),
            secret: false,
        }
    }

    pub fn map(self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        let inner = self.combine;
        Self {
            sources: self.sources,
            combine: Arc::new(move |values: &[String]| f(&inner(values))),
            secret: self.secret,
        }
    }

    /// Combine `parts`; `f` receives the resolved value of each part, in order
    ///
    /// The result is secret if any part is.
    pub fn zip(
        parts: Vec<Deferred>,
        f: impl Fn(&[String]) -> String + Send + Sync + 'static,
    ) -> Self {
        let mut sources = vec![];
        let mut spans: Vec<(Range<usize>, Combine)> = vec![];
        let secret = parts.iter().any(|part| part.secret);

        for part in parts {
            let start = sources.len();
            sources.extend(part.sources);
            spans.push((start..sources.len(), part.combine));
        }

        Self {
            sources,
            combine: Arc::new(move |values: &[String]| {
                let resolved: Vec<String> = spans
                    .iter()
                    .map(|(span, combine)| combine(&values[span.clone()]))
                    .collect();
                f(&resolved)
            }),
            secret,
        }
    }

    /// Mark the value as sensitive
    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn is_secret(&self) -> bool {
        self.secret
    }

    /// Logical names of every resource this value is derived from
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|source| source.resource.as_str())
    }

    /// Compute the value once all sources are known
    ///
    /// Fails with the first source `lookup` cannot provide.
    pub fn resolve(
        &self,
        lookup: &dyn Fn(&PropertyRef) -> Option<String>,
    ) -> Result<String, PropertyRef> {
        let values = self
            .sources
            .iter()
            .map(|source| lookup(source).ok_or_else(|| source.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((self.combine)(&values))
    }
}

impl std::fmt::Display for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("${")?;
        for (index, source) in self.sources.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{source}")?;
        }
        f.write_str("}")
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("sources", &self.sources)
            .field("secret", &self.secret)
            .finish_non_exhaustive()
    }
}

impl serde::Serialize for Deferred {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup(source: &PropertyRef) -> Option<String> {
        match (source.resource.as_str(), source.property.as_str()) {
            ("api", "defaultHostName") => Some("acme-dev-api.azurewebsites.net".into()),
            ("fnstore", "name") => Some("acmedevfnstore".into()),
            ("fnstore-keys", "key1") => Some("k1".into()),
            _ => None,
        }
    }

    #[test]
    fn map_derives_from_one_property() {
        let url = Deferred::property("api", "defaultHostName").map(|host| format!("https://{host}"));
        assert_eq!(url.dependencies().collect::<Vec<_>>(), vec!["api"]);
        assert_eq!(url.resolve(&lookup).unwrap(), "https://acme-dev-api.azurewebsites.net");
        assert_eq!(url.to_string(), "${api.defaultHostName}");
    }

    #[test]
    fn zip_keeps_every_source() {
        let name = Deferred::property("fnstore", "name").map(|name| name.to_uppercase());
        let key = Deferred::property("fnstore-keys", "key1").secret();
        let zipped = Deferred::zip(vec![name, key], |values| values.join("/"));

        assert!(zipped.is_secret());
        assert_eq!(
            zipped.dependencies().collect::<Vec<_>>(),
            vec!["fnstore", "fnstore-keys"]
        );
        assert_eq!(zipped.resolve(&lookup).unwrap(), "ACMEDEVFNSTORE/k1");
    }

    #[test]
    fn nested_zip() {
        let inner = Deferred::zip(
            vec![
                Deferred::property("fnstore", "name"),
                Deferred::property("fnstore-keys", "key1"),
            ],
            |values| values.concat(),
        );
        let outer = Deferred::zip(
            vec![Deferred::property("api", "defaultHostName"), inner],
            |values| format!("{}|{}", values[0], values[1]),
        );
        assert_eq!(
            outer.resolve(&lookup).unwrap(),
            "acme-dev-api.azurewebsites.net|acmedevfnstorek1"
        );
    }

    #[test]
    fn unresolvable_source_is_reported() {
        let value = Deferred::zip(
            vec![
                Deferred::property("api", "defaultHostName"),
                Deferred::property("topic", "endpoint"),
            ],
            |values| values.concat(),
        );
        assert_eq!(
            value.resolve(&lookup).unwrap_err(),
            PropertyRef::new("topic".into(), "endpoint".into())
        );
    }
}
