//! treebind - transform-and-cache engine with live tree binding
//!
//! Registers named XML documents from external byte sources, applies
//! named parameterized transforms to elements of those documents, caches
//! the results keyed by pointer identity, transform name and parameters,
//! and reconciles transformed output against a live tree of bound
//! application objects in one-shot or continuously-refreshed mode.
//!
//! The engine is domain-agnostic: applications plug in their own
//! [`Resolver`] to map marker ids to business objects, and their own
//! [`ByteSource`]s to supply document content.

pub mod bind;
pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod source;
pub mod transform;
pub mod xml;

pub use bind::{
    BindMode, BindingTree, BoundObject, ContainerObject, DefaultResolver, NodeId,
    PlaceholderObject, ResolveContext, Resolver,
};
pub use cache::{CacheEntry, CacheKey, CacheStats, TransformCache};
pub use config::EngineOptions;
pub use document::{Document, DocumentRegistry, Pointer};
pub use engine::{Engine, Transformed};
pub use source::{ByteSource, FileSource, MemorySource};
pub use transform::{
    ChainedTransform, FnTransform, IdentityTransform, Params, Transform, TransformRegistry,
    UniquifyIds,
};
pub use xml::{Element, Node};
