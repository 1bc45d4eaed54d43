//! Engine facade: registries, cache and the render-pass entry points
//!
//! The engine is an explicit value constructed at startup and passed by
//! reference into request handling; there are no process-wide
//! singletons. One render pass asks for a transformed view of a pointer
//! and reconciles a binding tree against the result.

use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::bind::{BindMode, BindingTree, ResolveContext, Resolver};
use crate::cache::{CacheKey, CacheStats, TransformCache};
use crate::config::EngineOptions;
use crate::document::{Document, DocumentRegistry, Pointer};
use crate::source::ByteSource;
use crate::transform::{Params, Transform, TransformRegistry};
use crate::xml::Element;

/// Result of a transform pass: the element tree and its serialized text
#[derive(Clone, Debug)]
pub struct Transformed {
    pub element: Arc<Element>,
    pub text: Arc<str>,
}

/// The transform-and-cache engine
pub struct Engine {
    documents: DocumentRegistry,
    transforms: TransformRegistry,
    cache: TransformCache,
    options: EngineOptions,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineOptions::default())
    }
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Engine {
            documents: DocumentRegistry::new(options.refresh_interval()),
            transforms: TransformRegistry::new(),
            cache: TransformCache::new(),
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn documents(&self) -> &DocumentRegistry {
        &self.documents
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Register a document under a globally unique name
    pub fn register_document(
        &self,
        name: impl Into<String>,
        source: Box<dyn ByteSource>,
    ) -> Result<Arc<Document>> {
        self.documents.register(name, source)
    }

    /// Registered document by name. A missing document is a
    /// configuration error; use [`DocumentRegistry::get`] for the
    /// optional form.
    pub fn document(&self, name: &str) -> Result<Arc<Document>> {
        self.documents
            .get(name)
            .ok_or_else(|| anyhow!("document '{}' is not registered", name))
    }

    /// Register a transform under a globally unique name
    pub fn register_transform<T>(&self, name: impl Into<String>, transform: T) -> Result<()>
    where
        T: Transform + 'static,
    {
        self.transforms.register(name, transform)
    }

    /// Register a transform whose validity also depends on further
    /// resource documents
    pub fn register_transform_with_resources<T>(
        &self,
        name: impl Into<String>,
        transform: T,
        resources: Vec<Arc<Document>>,
    ) -> Result<()>
    where
        T: Transform + 'static,
    {
        self.transforms
            .register_with_resources(name, transform, resources)
    }

    /// Transformed view of `pointer` under the named transform.
    ///
    /// Cached by (pointer identity, transform name, params); recomputed
    /// when the document or the transform moved past the cache entry's
    /// time. Concurrent cold misses on one key compute once.
    pub fn transformed(
        &self,
        pointer: &Pointer,
        transform: &str,
        params: &Params,
    ) -> Result<Transformed> {
        let registered = self
            .transforms
            .get(transform)
            .ok_or_else(|| anyhow!("transform '{}' is not registered", transform))?;
        let document = pointer.document();

        // One consolidated comparison point for both sources of change.
        let horizon = document
            .last_modified()?
            .max(registered.last_modified(params)?);

        let key = CacheKey::new(pointer, transform, params);
        let entry = self.cache.get_or_compute(&key, horizon, || {
            let input = pointer.resolve()?;
            let output = registered.apply(&input, params)?;
            let text = output.to_xml()?;
            Ok((output, text))
        })?;

        Ok(Transformed {
            element: entry.element,
            text: entry.text,
        })
    }

    /// One render pass: transform, then reconcile the binding tree
    /// against the result
    pub fn render(
        &self,
        tree: &mut BindingTree,
        pointer: &Pointer,
        transform: &str,
        params: &Params,
    ) -> Result<Transformed> {
        let transformed = self.transformed(pointer, transform, params)?;
        let cx = ResolveContext::new(self).with_document(pointer.document());
        tree.reconcile(&transformed.element, &cx)?;
        Ok(transformed)
    }

    /// A binding tree wired to this engine's configured marker attribute
    pub fn binding_tree(&self, mode: BindMode, resolver: Box<dyn Resolver>) -> BindingTree {
        BindingTree::new(mode, resolver).with_marker_attr(self.options.marker_attr.clone())
    }
}
