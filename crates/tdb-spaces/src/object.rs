//! Hierarchical trace objects, as far as register-space discovery needs them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// Canonical key path of an object, e.g. `Processes[1].Threads[2].Registers`.
///
/// Index keys are stored with their brackets (`[2]`) and render without a
/// leading separator; name keys are joined with `.`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalPath(Vec<String>);

impl CanonicalPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_index(key: &str) -> bool {
        key.starts_with('[') && key.ends_with(']')
    }

    pub fn key(&self, name: impl Into<String>) -> Self {
        let mut keys = self.0.clone();
        keys.push(name.into());
        Self(keys)
    }

    pub fn index(&self, index: impl fmt::Display) -> Self {
        self.key(format!("[{index}]"))
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 && !Self::is_index(key) {
                f.write_str(".")?;
            }
            f.write_str(key)?;
        }
        Ok(())
    }
}

/// Handle on a live object: its identity plus where it sits in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub path: CanonicalPath,
}

impl ObjectRef {
    pub fn new(id: ObjectId, path: CanonicalPath) -> Self {
        Self { id, path }
    }
}

/// Read access to the object tree of a trace.
pub trait ObjectModel: Send + Sync {
    /// True when the trace is addressed through objects rather than thread/frame slots.
    fn has_schema(&self) -> bool;

    /// Whether the object's schema declares it a register container.
    fn is_register_container(&self, object: &ObjectRef) -> bool;

    /// Nearest register container at or below `object`, for the given frame.
    fn query_register_container(&self, object: &ObjectRef, frame_level: u32) -> Option<ObjectRef>;
}

/// Object model of a trace without a schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObjectModel;

impl ObjectModel for NoObjectModel {
    fn has_schema(&self) -> bool {
        false
    }

    fn is_register_container(&self, _object: &ObjectRef) -> bool {
        false
    }

    fn query_register_container(&self, _object: &ObjectRef, _frame_level: u32) -> Option<ObjectRef> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registers_path() -> CanonicalPath {
        CanonicalPath::root()
            .key("Processes")
            .index(1)
            .key("Threads")
            .index(2)
            .key("Registers")
    }

    #[test]
    fn renders_index_keys_without_separator() {
        assert_eq!(
            registers_path().to_string(),
            "Processes[1].Threads[2].Registers"
        );
        assert_eq!(CanonicalPath::root().to_string(), "");
    }
}
