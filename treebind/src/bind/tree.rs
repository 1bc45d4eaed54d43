//! The live object tree and the reconciliation pass

use std::collections::HashMap;

use anyhow::{Context, Result, bail};

use crate::xml::{DEFAULT_MARKER_ATTR, Element};

use super::object::BoundObject;
use super::resolver::{ResolveContext, Resolver};

/// Stable handle to a bound-object record in the tree's arena
pub type NodeId = u64;

/// Whether reconciliation re-diffs on every pass or populates once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Populate on the first pass, then ignore further passes
    Static,
    /// Re-diff on every pass, sweeping stale root children
    Live,
}

struct BoundNode {
    marker: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    object: Box<dyn BoundObject>,
    engine_created: bool,
    touched: u64,
}

/// Live tree of bound objects, reconciled against transformed output.
///
/// Records live in a flat arena keyed by [`NodeId`]; the transformed
/// tree is only borrowed during a pass, so no reference cycles form
/// between the transformed tree and the live objects. A `None` parent
/// means a direct child of the root container.
pub struct BindingTree {
    nodes: HashMap<NodeId, BoundNode>,
    root_children: Vec<NodeId>,
    next_id: NodeId,
    pass: u64,
    mode: BindMode,
    populated: bool,
    resolver: Box<dyn Resolver>,
    marker_attr: String,
}

impl BindingTree {
    pub fn new(mode: BindMode, resolver: Box<dyn Resolver>) -> Self {
        BindingTree {
            nodes: HashMap::new(),
            root_children: Vec::new(),
            next_id: 1,
            pass: 0,
            mode,
            populated: false,
            resolver,
            marker_attr: DEFAULT_MARKER_ATTR.to_string(),
        }
    }

    /// Builder-style marker attribute override
    pub fn with_marker_attr(mut self, attr: impl Into<String>) -> Self {
        self.marker_attr = attr.into();
        self
    }

    pub fn mode(&self) -> BindMode {
        self.mode
    }

    /// Switch modes. An already-populated static tree starts re-diffing
    /// on the next pass once switched to live.
    pub fn set_mode(&mut self, mode: BindMode) {
        self.mode = mode;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct children of the root container, in attachment order
    pub fn root_children(&self) -> &[NodeId] {
        &self.root_children
    }

    /// Children of a bound node, in attachment order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn marker(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).map(|node| node.marker.as_str())
    }

    /// Child of `parent` (`None` = root container) with the given marker
    pub fn child(&self, parent: Option<NodeId>, marker: &str) -> Option<NodeId> {
        let siblings = match parent {
            None => self.root_children.as_slice(),
            Some(parent) => self.children(parent),
        };
        siblings
            .iter()
            .copied()
            .find(|id| self.nodes.get(id).is_some_and(|node| node.marker == marker))
    }

    pub fn object(&self, id: NodeId) -> Option<&dyn BoundObject> {
        self.nodes.get(&id).map(|node| node.object.as_ref())
    }

    pub fn object_mut(&mut self, id: NodeId) -> Option<&mut dyn BoundObject> {
        self.nodes.get_mut(&id).map(|node| node.object.as_mut())
    }

    /// Attach an application-managed child. Reconciliation records such
    /// children when their marker appears, but never replaces them and
    /// never sweeps them.
    pub fn attach_external(
        &mut self,
        parent: Option<NodeId>,
        marker: impl Into<String>,
        object: Box<dyn BoundObject>,
    ) -> Result<NodeId> {
        if let Some(parent) = parent {
            if !self.nodes.contains_key(&parent) {
                bail!("no bound node {} to attach under", parent);
            }
        }
        Ok(self.insert_node(parent, marker.into(), object, false))
    }

    fn insert_node(
        &mut self,
        parent: Option<NodeId>,
        marker: String,
        object: Box<dyn BoundObject>,
        engine_created: bool,
    ) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            BoundNode {
                marker,
                parent,
                children: Vec::new(),
                object,
                engine_created,
                touched: self.pass,
            },
        );
        match parent {
            None => self.root_children.push(id),
            Some(parent) => {
                if let Some(node) = self.nodes.get_mut(&parent) {
                    node.children.push(id);
                }
            }
        }
        id
    }

    /// One reconciliation pass over a transformed tree.
    ///
    /// Depth-first in document order: each marker element is bound under
    /// the object of its nearest marker-bearing ancestor, or under the
    /// root container when none exists. Engine-created children whose
    /// marker reappears are reused unchanged, which is what preserves
    /// externally attached state across passes. Externally attached
    /// children are recorded but never replaced. Anything else goes
    /// through the resolver; resolver failures surface.
    ///
    /// Duplicate marker ids under one logical parent within a single
    /// pass are an error.
    ///
    /// In live mode, engine-created direct children of the root whose
    /// markers were not seen this pass are detached afterwards. The
    /// sweep is root-level only; stale children of deeper containers
    /// are left in place.
    ///
    /// In static mode the tree populates exactly once; further calls
    /// return without touching it until [`set_mode`](Self::set_mode)
    /// switches to live.
    pub fn reconcile(&mut self, root: &Element, cx: &ResolveContext) -> Result<()> {
        if self.mode == BindMode::Static && self.populated {
            log::debug!("static tree already populated; skipping pass");
            return Ok(());
        }
        self.pass += 1;
        log::debug!("reconcile pass {} ({:?} mode)", self.pass, self.mode);

        // Iterative depth-first walk in document order, carrying the
        // nearest bound ancestor down the tree.
        let mut stack: Vec<(&Element, Option<NodeId>)> = vec![(root, None)];
        while let Some((element, parent)) = stack.pop() {
            let binding = match element.attr(&self.marker_attr) {
                Some(marker) => Some(self.bind_marker(parent, marker, element, cx)?),
                None => parent,
            };
            for child in element.child_elements().rev() {
                stack.push((child, binding));
            }
        }

        if self.mode == BindMode::Live {
            self.sweep_root();
        }
        self.populated = true;
        Ok(())
    }

    fn bind_marker(
        &mut self,
        parent: Option<NodeId>,
        marker: &str,
        element: &Element,
        cx: &ResolveContext,
    ) -> Result<NodeId> {
        if let Some(existing) = self.child(parent, marker) {
            if let Some(node) = self.nodes.get_mut(&existing) {
                if node.touched == self.pass {
                    bail!(
                        "duplicate marker id '{}' under the same logical parent",
                        marker
                    );
                }
                node.touched = self.pass;
                if !node.engine_created {
                    // Externally managed children always win.
                    log::debug!("marker '{}' is externally managed; left untouched", marker);
                }
            }
            return Ok(existing);
        }

        let object = self
            .resolver
            .resolve(marker, element, cx)
            .with_context(|| format!("resolving marker '{}'", marker))?;
        let id = self.insert_node(parent, marker.to_string(), object, true);
        log::debug!("bound new object for marker '{}'", marker);
        Ok(id)
    }

    fn sweep_root(&mut self) {
        let stale: Vec<NodeId> = self
            .root_children
            .iter()
            .copied()
            .filter(|id| {
                self.nodes
                    .get(id)
                    .is_some_and(|node| node.engine_created && node.touched != self.pass)
            })
            .collect();
        for id in stale {
            if let Some(marker) = self.marker(id) {
                log::debug!("sweeping stale root child '{}'", marker);
            }
            self.detach(id);
        }
    }

    // Remove a node and its whole subtree from the arena.
    fn detach(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        match node.parent {
            None => self.root_children.retain(|child| *child != id),
            Some(parent) => {
                if let Some(parent) = self.nodes.get_mut(&parent) {
                    parent.children.retain(|child| *child != id);
                }
            }
        }
        let mut pending = node.children;
        while let Some(child) = pending.pop() {
            if let Some(node) = self.nodes.remove(&child) {
                pending.extend(node.children);
            }
        }
    }
}
