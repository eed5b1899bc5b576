//! Schema migration registry (spec.md §10 ambient stack: `cetane`).

mod m0001_initial;

use cetane::prelude::MigrationRegistry;

/// Build the migration registry for this crate's schema.
pub fn registry() -> MigrationRegistry {
    let mut reg = MigrationRegistry::new();
    reg.register(m0001_initial::migration());
    reg
}
