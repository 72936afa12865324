use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use parking_lot::RwLock;
use tdb_spaces::{CanonicalPath, ObjectId, ObjectModel, ObjectRef};

/// Key under which frames are listed; only the `[frame_level]` child of such a
/// node is searched for register containers.
pub const STACK_KEY: &str = "Stack";

#[derive(Debug)]
struct Node {
    object: ObjectRef,
    container: bool,
    children: Vec<ObjectId>,
}

/// In-memory object tree.
#[derive(Debug)]
pub struct TestObjects {
    has_schema: bool,
    nodes: RwLock<HashMap<ObjectId, Node>>,
    next_id: AtomicU64,
    queries: AtomicUsize,
}

impl TestObjects {
    pub fn new(has_schema: bool) -> Self {
        Self {
            has_schema,
            nodes: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn root(&self, key: &str) -> ObjectRef {
        self.insert(CanonicalPath::root().key(key), false, None)
    }

    /// Add the named child `key` under `parent`.
    pub fn child(&self, parent: &ObjectRef, key: &str, container: bool) -> ObjectRef {
        self.insert(parent.path.key(key), container, Some(parent.id))
    }

    /// Add the `[index]` element under `parent`.
    pub fn element(&self, parent: &ObjectRef, index: u32, container: bool) -> ObjectRef {
        self.insert(parent.path.index(index), container, Some(parent.id))
    }

    /// Number of `query_register_container` calls.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn insert(&self, path: CanonicalPath, container: bool, parent: Option<ObjectId>) -> ObjectRef {
        let id = ObjectId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let object = ObjectRef::new(id, path);
        let mut nodes = self.nodes.write();
        nodes.insert(
            id,
            Node {
                object: object.clone(),
                container,
                children: Vec::new(),
            },
        );
        if let Some(node) = parent.and_then(|parent| nodes.get_mut(&parent)) {
            node.children.push(id);
        }
        object
    }
}

impl ObjectModel for TestObjects {
    fn has_schema(&self) -> bool {
        self.has_schema
    }

    fn is_register_container(&self, object: &ObjectRef) -> bool {
        self.nodes
            .read()
            .get(&object.id)
            .is_some_and(|node| node.container)
    }

    fn query_register_container(&self, object: &ObjectRef, frame_level: u32) -> Option<ObjectRef> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let frame_key = format!("[{frame_level}]");
        let nodes = self.nodes.read();
        let mut queue = VecDeque::from([object.id]);
        while let Some(id) = queue.pop_front() {
            let node = nodes.get(&id)?;
            if node.container {
                return Some(node.object.clone());
            }
            let is_stack = node.object.path.keys().last().is_some_and(|k| k == STACK_KEY);
            for child in &node.children {
                let Some(child_node) = nodes.get(child) else {
                    continue;
                };
                let child_key = child_node.object.path.keys().last();
                if is_stack && child_key.map(String::as_str) != Some(frame_key.as_str()) {
                    continue;
                }
                queue.push_back(*child);
            }
        }
        None
    }
}
