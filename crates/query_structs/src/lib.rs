//! Common types shared across the query performance crates.
//!
//! Holds the fixed feature schema, the error taxonomy, and the records that
//! travel between the storage layer, the model, and the job orchestrators.

mod error;
mod model;
mod model_kind;
mod schema;
mod validation;

pub use error::*;
pub use model::*;
pub use model_kind::*;
pub use schema::*;
pub use validation::*;
