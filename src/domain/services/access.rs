//! # Timeline Access Matrix
//!
//! Pure role × visibility decisions for reading and writing timeline
//! events.
//!
//! | role        | read `all` | read `finance` | write `all` | write `finance` |
//! |-------------|:----------:|:--------------:|:-----------:|:---------------:|
//! | admin       | ✓          | ✓              | ✓           | ✓               |
//! | financeiro  | ✓          | ✓              | ✓           | ✓               |
//! | auditoria   | ✓          |                |             |                 |
//! | compras     | ✓          |                | ✓           |                 |
//! | vendas      | ✓          |                | ✓           |                 |
//! | estoque     | ✓          |                | ✓           |                 |
//!
//! Finance events are shown to `financeiro` and `admin` only. The auditor
//! reads everything else and writes nothing.

use crate::domain::value_objects::{Role, Visibility};

/// Returns true if `role` may read events with `visibility`.
#[must_use]
pub const fn can_read(role: Role, visibility: Visibility) -> bool {
    match visibility {
        Visibility::All => true,
        Visibility::Finance => matches!(role, Role::Admin | Role::Financeiro),
    }
}

/// Returns true if `role` may author events with `visibility`.
#[must_use]
pub const fn can_write(role: Role, visibility: Visibility) -> bool {
    match role {
        Role::Auditoria => false,
        Role::Admin | Role::Financeiro => true,
        Role::Compras | Role::Vendas | Role::Estoque => matches!(visibility, Visibility::All),
    }
}

/// Visibilities `role` may read.
#[must_use]
pub fn readable_visibilities(role: Role) -> Vec<Visibility> {
    Visibility::ALL
        .into_iter()
        .filter(|v| can_read(role, *v))
        .collect()
}
