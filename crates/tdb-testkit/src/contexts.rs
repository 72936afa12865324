use std::collections::BTreeMap;

use parking_lot::Mutex;
use tdb_spaces::{ContextResolver, ExecutionContext, ObjectRef};

/// Thread directory backed by a map.
#[derive(Debug, Default)]
pub struct TestContexts {
    contexts: Mutex<BTreeMap<i64, ExecutionContext>>,
}

impl TestContexts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: i64, name: &str) -> ExecutionContext {
        self.insert(ExecutionContext::new(key, name))
    }

    pub fn add_with_object(&self, key: i64, name: &str, object: ObjectRef) -> ExecutionContext {
        self.insert(ExecutionContext::new(key, name).with_object(object))
    }

    pub fn remove(&self, key: i64) -> Option<ExecutionContext> {
        self.contexts.lock().remove(&key)
    }

    fn insert(&self, context: ExecutionContext) -> ExecutionContext {
        self.contexts.lock().insert(context.key, context.clone());
        context
    }
}

impl ContextResolver for TestContexts {
    fn context(&self, key: i64) -> Option<ExecutionContext> {
        self.contexts.lock().get(&key).cloned()
    }
}
