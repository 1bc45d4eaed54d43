//! Named transform programs and their registry
//!
//! A transform is a pure mapping from an element plus a parameter bag to
//! a new element. Purity is load-bearing: results are cached, and cache
//! validity is judged purely on modification times.

pub mod chain;
pub mod uniquify;

pub use chain::ChainedTransform;
pub use uniquify::UniquifyIds;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::xml::Element;

/// Order-irrelevant key to value bag attached to a transform invocation.
/// Part of the cache key, so it is equality-comparable and hashable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    values: BTreeMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Params::default()
    }

    /// Builder-style insert
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A named transform program.
pub trait Transform: Send + Sync {
    /// Apply the transform. Must be referentially transparent for
    /// identical `(input, params)` pairs; results are cached on that
    /// assumption. Failures propagate to the caller, never silently.
    fn apply(&self, input: &Element, params: &Params) -> Result<Element>;

    /// Modification time of the transform's own definition. The default
    /// is the Unix epoch: the registry folds in the registration instant
    /// and dependent resources.
    fn last_modified(&self, _params: &Params) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }
}

/// Returns its input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl Transform for IdentityTransform {
    fn apply(&self, input: &Element, _params: &Params) -> Result<Element> {
        Ok(input.clone())
    }
}

/// Transform built from a closure; handy for application glue and stubs
pub struct FnTransform<F> {
    f: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&Element, &Params) -> Result<Element> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnTransform { f }
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(&Element, &Params) -> Result<Element> + Send + Sync,
{
    fn apply(&self, input: &Element, params: &Params) -> Result<Element> {
        (self.f)(input, params)
    }
}

/// A transform as registered: the program, its declared dependent
/// resources and the registration instant.
pub struct RegisteredTransform {
    name: String,
    transform: Arc<dyn Transform>,
    resources: Vec<Arc<Document>>,
    registered_at: DateTime<Utc>,
}

impl RegisteredTransform {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, input: &Element, params: &Params) -> Result<Element> {
        self.transform
            .apply(input, params)
            .with_context(|| format!("transform '{}' failed", self.name))
    }

    /// Max of the registration instant, the transform's own definition
    /// time and every declared dependent resource's time. Used only to
    /// decide cache validity. Probing a dependent resource may reload
    /// that resource; the document being transformed is never touched.
    pub fn last_modified(&self, params: &Params) -> Result<DateTime<Utc>> {
        let mut latest = self.registered_at.max(self.transform.last_modified(params));
        for resource in &self.resources {
            latest = latest.max(resource.last_modified()?);
        }
        Ok(latest)
    }
}

/// Name to transform map shared across request threads
#[derive(Default)]
pub struct TransformRegistry {
    transforms: RwLock<HashMap<String, Arc<RegisteredTransform>>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        TransformRegistry::default()
    }

    /// Register a transform under a globally unique name
    pub fn register<T>(&self, name: impl Into<String>, transform: T) -> Result<()>
    where
        T: Transform + 'static,
    {
        self.register_with_resources(name, transform, Vec::new())
    }

    /// Register a transform that depends on further resources, e.g. the
    /// stylesheet documents a mapping is defined in. Their modification
    /// times feed the transform's `last_modified`.
    pub fn register_with_resources<T>(
        &self,
        name: impl Into<String>,
        transform: T,
        resources: Vec<Arc<Document>>,
    ) -> Result<()>
    where
        T: Transform + 'static,
    {
        let name = name.into();
        let mut transforms = self.transforms.write().unwrap();
        if transforms.contains_key(&name) {
            bail!("transform '{}' is already registered", name);
        }
        log::debug!(
            "registered transform '{}' with {} dependent resource(s)",
            name,
            resources.len()
        );
        transforms.insert(
            name.clone(),
            Arc::new(RegisteredTransform {
                name,
                transform: Arc::new(transform),
                resources,
                registered_at: Utc::now(),
            }),
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegisteredTransform>> {
        self.transforms.read().unwrap().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentRegistry;
    use crate::source::MemorySource;
    use crate::xml::parse;
    use std::time::Duration;

    #[test]
    fn test_params_are_order_irrelevant() {
        let ab = Params::new().set("a", "1").set("b", "2");
        let ba = Params::new().set("b", "2").set("a", "1");
        assert_eq!(ab, ba);

        let mut keyed = std::collections::HashMap::new();
        keyed.insert(ab, "entry");
        assert!(keyed.contains_key(&ba));
    }

    #[test]
    fn test_identity_transform() {
        let input = parse(r#"<root><a marker="x1"/></root>"#).unwrap();
        let output = IdentityTransform.apply(&input, &Params::new()).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_duplicate_name_errors() {
        let registry = TransformRegistry::new();
        registry.register("identity", IdentityTransform).unwrap();

        let err = registry
            .register("identity", IdentityTransform)
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_apply_failure_names_the_transform() {
        let registry = TransformRegistry::new();
        registry
            .register(
                "broken",
                FnTransform::new(|_input: &Element, _params: &Params| {
                    bail!("stylesheet rejected the input")
                }),
            )
            .unwrap();

        let input = parse("<root/>").unwrap();
        let err = registry
            .get("broken")
            .unwrap()
            .apply(&input, &Params::new())
            .unwrap_err();
        assert!(format!("{:#}", err).contains("transform 'broken' failed"));
    }

    #[test]
    fn test_last_modified_includes_dependent_resources() {
        let documents = DocumentRegistry::new(Duration::ZERO);
        let source = Arc::new(MemorySource::new("<styles/>"));
        let stylesheet = documents
            .register("styles", Box::new(Arc::clone(&source)))
            .unwrap();

        let registry = TransformRegistry::new();
        registry
            .register_with_resources("styled", IdentityTransform, vec![stylesheet])
            .unwrap();
        let registered = registry.get("styled").unwrap();

        let before = registered.last_modified(&Params::new()).unwrap();

        let bumped = Utc::now() + chrono::Duration::seconds(30);
        source.set_modified(bumped);

        assert_eq!(registered.last_modified(&Params::new()).unwrap(), bumped);
        assert!(bumped > before);
    }

    #[test]
    fn test_transform_own_time_wins_when_newer() {
        struct Versioned {
            defined_at: DateTime<Utc>,
        }
        impl Transform for Versioned {
            fn apply(&self, input: &Element, _params: &Params) -> Result<Element> {
                Ok(input.clone())
            }
            fn last_modified(&self, _params: &Params) -> DateTime<Utc> {
                self.defined_at
            }
        }

        let defined_at = Utc::now() + chrono::Duration::seconds(120);
        let registry = TransformRegistry::new();
        registry
            .register("versioned", Versioned { defined_at })
            .unwrap();

        let registered = registry.get("versioned").unwrap();
        assert_eq!(registered.last_modified(&Params::new()).unwrap(), defined_at);
    }
}
