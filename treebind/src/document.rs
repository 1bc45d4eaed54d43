//! Registered documents, pointers into them, and the document registry
//!
//! A document wraps a byte source and a parsed tree. The tree is swapped
//! atomically on reload so request threads can keep reading while a
//! change check replaces it. Modification-time checks against the source
//! are gated to at most one per configured interval.

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::source::ByteSource;
use crate::xml::Element;

// Process-wide pointer identity counter. Identity is by reference, not by
// content: two separately created pointers to the same location differ.
static POINTER_IDS: AtomicU64 = AtomicU64::new(1);

fn next_pointer_id() -> u64 {
    POINTER_IDS.fetch_add(1, Ordering::Relaxed)
}

/// Callback invoked synchronously after a document reloads
pub type Observer = Box<dyn Fn(&Document) + Send + Sync>;

/// A named hierarchical document backed by an external byte source.
///
/// Created by [`DocumentRegistry::register`] and alive for the process
/// lifetime; never implicitly destroyed.
pub struct Document {
    name: String,
    source: Box<dyn ByteSource>,
    tree: ArcSwap<Element>,
    refresh: Mutex<RefreshState>,
    observers: Mutex<Vec<Observer>>,
    check_interval: Duration,
    root_pointer_id: u64,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("source", &self.source.describe())
            .field("check_interval", &self.check_interval)
            .field("root_pointer_id", &self.root_pointer_id)
            .finish_non_exhaustive()
    }
}

struct RefreshState {
    modified: DateTime<Utc>,
    checked_at: Instant,
}

impl Document {
    fn open(name: String, source: Box<dyn ByteSource>, check_interval: Duration) -> Result<Self> {
        let modified = source
            .last_modified()
            .with_context(|| format!("checking modification time of {}", source.describe()))?;
        let tree = parse_source(&name, &*source)?;

        Ok(Document {
            name,
            source,
            tree: ArcSwap::from_pointee(tree),
            refresh: Mutex::new(RefreshState {
                modified,
                checked_at: Instant::now(),
            }),
            observers: Mutex::new(Vec::new()),
            check_interval,
            root_pointer_id: next_pointer_id(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current parsed tree
    pub fn tree(&self) -> Arc<Element> {
        self.tree.load_full()
    }

    /// Register an observer notified synchronously after each reload
    pub fn subscribe(&self, observer: Observer) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Cached modification time, re-checked against the source at most
    /// once per configured interval. A detected change re-parses the
    /// tree and notifies observers before this returns. I/O and parse
    /// failures propagate; the previous tree and time are kept so the
    /// next check retries.
    pub fn last_modified(&self) -> Result<DateTime<Utc>> {
        let mut refresh = self.refresh.lock().unwrap();
        if refresh.checked_at.elapsed() < self.check_interval {
            return Ok(refresh.modified);
        }
        refresh.checked_at = Instant::now();

        let current = self
            .source
            .last_modified()
            .with_context(|| format!("checking modification time of {}", self.source.describe()))?;
        if current > refresh.modified {
            log::debug!(
                "document '{}' changed on {}; reloading",
                self.name,
                self.source.describe()
            );
            let tree = parse_source(&self.name, &*self.source)?;
            self.tree.store(Arc::new(tree));
            refresh.modified = current;

            for observer in self.observers.lock().unwrap().iter() {
                observer(self);
            }
        }
        Ok(refresh.modified)
    }
}

fn parse_source(name: &str, source: &dyn ByteSource) -> Result<Element> {
    let mut reader = source.open()?;
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .with_context(|| format!("reading {}", source.describe()))?;
    crate::xml::parse(&content).with_context(|| format!("parsing document '{}'", name))
}

/// Opaque reference-identity handle to a location inside a registered
/// document: the root or a sub-element. Clones share identity; pointers
/// created separately do not, even for the same location.
#[derive(Clone)]
pub struct Pointer {
    id: u64,
    document: Arc<Document>,
    path: Arc<[usize]>,
}

impl Pointer {
    /// Pointer to the document root. Stable: every call for the same
    /// document yields the same identity.
    pub fn root(document: &Arc<Document>) -> Pointer {
        Pointer {
            id: document.root_pointer_id,
            document: Arc::clone(document),
            path: Arc::from(Vec::new()),
        }
    }

    /// Pointer to the sub-element reached by `path` (indices into child
    /// elements, level by level). Fails if no element is there now.
    pub fn at(document: &Arc<Document>, path: &[usize]) -> Result<Pointer> {
        if document.tree().element_at(path).is_none() {
            bail!(
                "no element at {:?} in document '{}'",
                path,
                document.name()
            );
        }
        Ok(Pointer {
            id: next_pointer_id(),
            document: Arc::clone(document),
            path: Arc::from(path.to_vec()),
        })
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Copy of the element this pointer targets in the current tree
    pub fn resolve(&self) -> Result<Element> {
        let tree = self.document.tree();
        tree.element_at(&self.path).cloned().ok_or_else(|| {
            anyhow!(
                "pointer target {:?} no longer exists in document '{}'",
                self.path,
                self.document.name()
            )
        })
    }
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Pointer {}

impl std::hash::Hash for Pointer {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pointer({} in '{}' at {:?})",
            self.id,
            self.document.name(),
            self.path
        )
    }
}

/// Name to document map shared across request threads
pub struct DocumentRegistry {
    documents: RwLock<HashMap<String, Arc<Document>>>,
    check_interval: Duration,
}

impl DocumentRegistry {
    pub fn new(check_interval: Duration) -> Self {
        DocumentRegistry {
            documents: RwLock::new(HashMap::new()),
            check_interval,
        }
    }

    /// Register a document under a globally unique name. The source is
    /// parsed eagerly; a missing or malformed document fails here, at
    /// load time, not per request.
    pub fn register(
        &self,
        name: impl Into<String>,
        source: Box<dyn ByteSource>,
    ) -> Result<Arc<Document>> {
        let name = name.into();
        {
            let documents = self.documents.read().unwrap();
            if documents.contains_key(&name) {
                bail!("document '{}' is already registered", name);
            }
        }

        // Parse outside the write lock; re-check the name on insert.
        let document = Arc::new(Document::open(name.clone(), source, self.check_interval)?);

        let mut documents = self.documents.write().unwrap();
        if documents.contains_key(&name) {
            bail!("document '{}' is already registered", name);
        }
        log::debug!("registered document '{}'", name);
        documents.insert(name, Arc::clone(&document));
        Ok(document)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Document>> {
        self.documents.read().unwrap().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
