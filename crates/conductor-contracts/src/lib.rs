//! Contracts consumed by the conductor engine.
//!
//! The engine depends on the [`ContractValidator`] trait, not on any schema
//! system. [`ShapeValidator`] is the default implementation: a small
//! interpreter over declarative [`Shape`]s plus primitive JSON-schema type
//! checks for wiring and routing.

pub mod catalog;
pub mod schema;
pub mod shape;
pub mod validator;

pub use catalog::{CATALOG, Catalog};
pub use schema::{check_value, schema_type, types_compatible, value_matches};
pub use shape::{Field, ROOT_PATH, Shape, json_type_name, optional, render_path, required};
pub use validator::{ContractValidator, ShapeValidator};
