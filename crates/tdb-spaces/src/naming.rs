//! Physical table names for sub-spaces.

use tdb_store::NO_CONTEXT;

use crate::space::AddressSpace;

/// Derive the backing table name of a sub-space.
///
/// Register spaces bound to a context get `<manager>_<space>_<ctx>_<frame>`,
/// everything else `<manager>_<space>`. Underscores in the space name are
/// doubled, so a single `_` after the space name only ever starts the
/// context suffix.
pub fn table_name(
    manager: &str,
    space: &AddressSpace,
    context_key: i64,
    frame_level: u32,
) -> String {
    let space_name = space.name().replace('_', "__");
    if space.is_register() && context_key != NO_CONTEXT {
        format!("{manager}_{space_name}_{context_key}_{frame_level}")
    } else {
        format!("{manager}_{space_name}")
    }
}
