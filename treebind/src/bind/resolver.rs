//! Resolver capability: marker id plus transformed element in, bound
//! object out
//!
//! This is the seam where application domain logic plugs in. The engine
//! stays domain-agnostic; applications supply a resolver by composition
//! and map marker ids to their own object kinds.

use std::sync::Arc;

use anyhow::{Result, bail};

use crate::document::Document;
use crate::engine::Engine;
use crate::xml::{DEFAULT_MARKER_ATTR, Element};

use super::object::{BoundObject, ContainerObject, PlaceholderObject};

/// Turns a marker id and its transformed element into a concrete bound
/// object.
pub trait Resolver: Send + Sync {
    /// Construct the bound object for `id`. Failing to produce one is a
    /// surfaced configuration error, not a silently skipped marker.
    fn resolve(
        &self,
        id: &str,
        element: &Element,
        cx: &ResolveContext,
    ) -> Result<Box<dyn BoundObject>>;
}

/// What a resolver can reach while resolving: the owning document, and
/// further registered resources through the engine (for nested or
/// linked content).
pub struct ResolveContext<'a> {
    engine: Option<&'a Engine>,
    document: Option<&'a Arc<Document>>,
}

impl<'a> ResolveContext<'a> {
    /// Context with no engine behind it, for standalone reconciliation
    pub fn detached() -> Self {
        ResolveContext {
            engine: None,
            document: None,
        }
    }

    pub fn new(engine: &'a Engine) -> Self {
        ResolveContext {
            engine: Some(engine),
            document: None,
        }
    }

    pub fn with_document(mut self, document: &'a Arc<Document>) -> Self {
        self.document = Some(document);
        self
    }

    /// The document the transformed output came from, if known
    pub fn document(&self) -> Option<&'a Arc<Document>> {
        self.document
    }

    /// Look up another registered document by name
    pub fn resource(&self, name: &str) -> Result<Arc<Document>> {
        let Some(engine) = self.engine else {
            bail!("no engine available to resolve resource '{}'", name);
        };
        engine.document(name)
    }
}

/// Fallback resolver: a generic container for markers that host further
/// markers, a diagnostic placeholder for leaves.
pub struct DefaultResolver {
    marker_attr: String,
}

impl DefaultResolver {
    pub fn new() -> Self {
        DefaultResolver {
            marker_attr: DEFAULT_MARKER_ATTR.to_string(),
        }
    }

    pub fn with_marker_attr(attr: impl Into<String>) -> Self {
        DefaultResolver {
            marker_attr: attr.into(),
        }
    }
}

impl Default for DefaultResolver {
    fn default() -> Self {
        DefaultResolver::new()
    }
}

impl Resolver for DefaultResolver {
    fn resolve(
        &self,
        id: &str,
        element: &Element,
        _cx: &ResolveContext,
    ) -> Result<Box<dyn BoundObject>> {
        if element.has_marker_descendant(&self.marker_attr) {
            Ok(Box::new(ContainerObject::new(id)))
        } else {
            Ok(Box::new(PlaceholderObject::new(id, element.name())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn test_default_resolver_picks_container_or_leaf() {
        let resolver = DefaultResolver::new();
        let cx = ResolveContext::detached();

        let nested = parse(r#"<panel marker="outer"><row><cell marker="inner"/></row></panel>"#)
            .unwrap();
        let object = resolver.resolve("outer", &nested, &cx).unwrap();
        let container = object.as_any().downcast_ref::<ContainerObject>().unwrap();
        assert_eq!(container.marker(), "outer");

        let leaf = parse(r#"<cell marker="inner"/>"#).unwrap();
        let object = resolver.resolve("inner", &leaf, &cx).unwrap();
        let placeholder = object.as_any().downcast_ref::<PlaceholderObject>().unwrap();
        assert_eq!(placeholder.marker(), "inner");
        assert_eq!(placeholder.element_name(), "cell");
    }

    #[test]
    fn test_detached_context_has_no_resources() {
        let cx = ResolveContext::detached();
        assert!(cx.document().is_none());
        assert!(cx.resource("anything").is_err());
    }
}
