//! Core model types: schemas, values, observable models and tree roots.

mod model;
mod root;
mod schema;
mod validation;
mod value;

pub use model::Model;
pub use root::RootModel;
pub use schema::{Field, FieldType, ModelSchema, ModelSchemaBuilder};
pub use validation::Constraint;
pub use value::Value;
