//! Address spaces, execution contexts and the keys used to look spaces up.

use std::fmt;

use crate::object::ObjectRef;

/// Name under which the sentinel "no address" space is persisted.
pub const NO_ADDRESS_SPACE_NAME: &str = "NO_ADDRESS_SPACE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpaceKind {
    Memory,
    Register,
    NoAddress,
    Constant,
    Unique,
    Stack,
}

/// A logical partition of addressable storage.
///
/// Ordering follows the space id, so ordered collections of spaces iterate
/// the way the architecture numbers them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressSpace {
    id: u32,
    name: String,
    kind: SpaceKind,
    overlay_base: Option<String>,
}

impl AddressSpace {
    pub fn new(id: u32, name: impl Into<String>, kind: SpaceKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            overlay_base: None,
        }
    }

    pub fn memory(id: u32, name: impl Into<String>) -> Self {
        Self::new(id, name, SpaceKind::Memory)
    }

    pub fn register(id: u32, name: impl Into<String>) -> Self {
        Self::new(id, name, SpaceKind::Register)
    }

    pub fn no_address() -> Self {
        Self::new(u32::MAX, NO_ADDRESS_SPACE_NAME, SpaceKind::NoAddress)
    }

    /// A named space layered on `base`. It takes the kind of its base.
    pub fn overlay(id: u32, name: impl Into<String>, base: &AddressSpace) -> Self {
        Self {
            id,
            name: name.into(),
            kind: base.kind,
            overlay_base: Some(base.name.clone()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    pub fn overlay_base(&self) -> Option<&str> {
        self.overlay_base.as_deref()
    }

    pub fn is_overlay(&self) -> bool {
        self.overlay_base.is_some()
    }

    pub fn is_memory(&self) -> bool {
        self.kind == SpaceKind::Memory
    }

    pub fn is_register(&self) -> bool {
        self.kind == SpaceKind::Register
    }

    pub fn is_no_address(&self) -> bool {
        self.kind == SpaceKind::NoAddress
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An independent thread or core of execution in the recorded target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionContext {
    pub key: i64,
    pub name: String,
    /// Backing object when the trace is object-addressed.
    pub object: Option<ObjectRef>,
}

impl ExecutionContext {
    pub fn new(key: i64, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            object: None,
        }
    }

    pub fn with_object(mut self, object: ObjectRef) -> Self {
        self.object = Some(object);
        self
    }
}

/// A frame handle: either an object that already encodes the frame, or a
/// numbered level on a context's stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackFrame {
    Object(ObjectRef),
    Level {
        context: ExecutionContext,
        level: u32,
    },
}

/// What a caller asks the registry for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceKey {
    pub space: AddressSpace,
    pub context: Option<ExecutionContext>,
    pub frame_level: u32,
}

impl SpaceKey {
    pub fn memory(space: AddressSpace) -> Self {
        Self {
            space,
            context: None,
            frame_level: 0,
        }
    }

    pub fn register(space: AddressSpace, context: ExecutionContext, frame_level: u32) -> Self {
        Self {
            space,
            context: Some(context),
            frame_level,
        }
    }
}

/// How a register bank is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterKey {
    ByContextFrame {
        context: ExecutionContext,
        frame_level: u32,
    },
    ByObject {
        object: ObjectRef,
        frame_level: u32,
    },
}
