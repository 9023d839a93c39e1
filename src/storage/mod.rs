//! # Graph Storage Layer
//!
//! A schema-on-JSON row model over a SQL backing store: nodes carry a
//! label-array + property-map column, relationships carry a type +
//! endpoints + property-map. This module defines the `GraphStore` contract
//! — the Adapter Abstraction (§4.6 in spec terms) — and two interchangeable
//! implementations differing only in their underlying row-store mechanics.
//!
//! | Backend | Module | Feature |
//! |---------|--------|---------|
//! | SQLite  | `sqlite` | `sqlite` (default) |
//! | Postgres | `postgres` | `postgres` |

pub mod engine;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use engine::{GraphStore, SCHEMA_VERSION};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
