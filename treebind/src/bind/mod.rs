//! Live-tree reconciliation against transformed output
//!
//! A binding tree holds the application-level objects that correspond to
//! marker elements in a transformed result. Each reconciliation pass
//! walks the transformed tree and brings the live tree in line with it,
//! reusing objects whose markers survived so that externally attached
//! state survives with them.

pub mod object;
pub mod resolver;
pub mod tree;

pub use object::{BoundObject, ContainerObject, PlaceholderObject};
pub use resolver::{DefaultResolver, ResolveContext, Resolver};
pub use tree::{BindMode, BindingTree, NodeId};
