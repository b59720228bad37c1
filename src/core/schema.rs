//! Declared field types and model schemas.

use crate::core::{Constraint, Value};
use crate::error::{ConfigError, Result};
use crate::sources::KvTree;
use std::fmt;
use std::sync::Arc;

/// Structural type descriptor for a declared field.
///
/// Nested model types are referenced by handle, so a schema tree is built
/// bottom-up from independently declared [`ModelSchema`]s.
#[derive(Clone)]
pub enum FieldType {
    /// Any value.
    Any,
    /// `true` / `false`.
    Bool,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float. Integers are widened when constructing from a key-value
    /// tree, but [`Model::set_field`](crate::core::Model::set_field) requires a float.
    Float,
    /// UTF-8 string.
    String,
    /// `null` or a value of the inner type.
    Optional(Box<FieldType>),
    /// Ordered sequence of the inner type.
    List(Box<FieldType>),
    /// String-keyed mapping to the inner type.
    Map(Box<FieldType>),
    /// Nested child model of the given schema.
    Model(Arc<ModelSchema>),
}

impl FieldType {
    /// `Optional(inner)`.
    pub fn optional(inner: FieldType) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// `List(inner)`.
    pub fn list(inner: FieldType) -> Self {
        Self::List(Box::new(inner))
    }

    /// `Map(inner)`.
    pub fn map(inner: FieldType) -> Self {
        Self::Map(Box::new(inner))
    }

    /// `Model(schema)`.
    pub fn model(schema: &Arc<ModelSchema>) -> Self {
        Self::Model(Arc::clone(schema))
    }

    /// Returns true if `value` structurally satisfies this type.
    ///
    /// Model values match only when they were built from this exact schema
    /// handle.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Optional(_), Value::Null) => true,
            (Self::Optional(inner), value) => inner.accepts(value),
            (Self::List(inner), Value::List(items)) => items.iter().all(|item| inner.accepts(item)),
            (Self::Map(inner), Value::Map(entries)) => {
                entries.values().all(|item| inner.accepts(item))
            }
            (Self::Model(schema), Value::Model(model)) => Arc::ptr_eq(schema, model.schema()),
            _ => false,
        }
    }

    /// The nested model schema, looking through `Optional`.
    pub fn model_schema(&self) -> Option<&Arc<ModelSchema>> {
        match self {
            Self::Model(schema) => Some(schema),
            Self::Optional(inner) => inner.model_schema(),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Bool => write!(f, "bool"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Optional(inner) => write!(f, "optional<{}>", inner),
            Self::List(inner) => write!(f, "list<{}>", inner),
            Self::Map(inner) => write!(f, "map<{}>", inner),
            Self::Model(schema) => write!(f, "{}", schema.name()),
        }
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// A named, typed slot declared on a schema.
pub struct Field {
    name: String,
    ty: FieldType,
    default: Option<KvTree>,
    constraints: Vec<Arc<dyn Constraint>>,
}

impl Field {
    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    /// Raw default used when construction data lacks this field.
    pub fn default_value(&self) -> Option<&KvTree> {
        self.default.as_ref()
    }

    /// Check `value` against the declared type and every constraint.
    ///
    /// `path` is used in the error to name the field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TypeMismatch`] if any check fails.
    pub fn check(&self, path: &str, value: &Value) -> Result<()> {
        if !self.ty.accepts(value) {
            return Err(ConfigError::type_mismatch(
                path,
                format!("expected {}, found {}", self.ty, value.kind_name()),
            ));
        }
        for constraint in &self.constraints {
            constraint
                .check(value)
                .map_err(|e| ConfigError::type_mismatch(path, e.to_string()))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("default", &self.default)
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

/// Ordered set of declared fields for one model type.
///
/// # Examples
///
/// ```rust
/// use reactive_config::core::{FieldType, ModelSchema};
///
/// let font = ModelSchema::builder("Font")
///     .field("size", FieldType::Integer)
///     .build();
///
/// let theme = ModelSchema::builder("Theme")
///     .field("color", FieldType::String)
///     .field("font", FieldType::model(&font))
///     .build();
///
/// assert_eq!(theme.field_names().collect::<Vec<_>>(), ["color", "font"]);
/// ```
#[derive(Debug)]
pub struct ModelSchema {
    name: String,
    fields: Vec<Field>,
}

impl ModelSchema {
    /// Start declaring a schema.
    pub fn builder(name: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(Field::name)
    }

    /// Position of a declared field.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Look up a declared field.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Returns true if `name` is declared.
    pub fn has_field(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }
}

/// Builder for [`ModelSchema`].
pub struct ModelSchemaBuilder {
    name: String,
    fields: Vec<Field>,
}

impl ModelSchemaBuilder {
    /// Declare a required field.
    ///
    /// Declaring a name twice replaces the earlier declaration in place.
    pub fn field(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.push(Field {
            name: name.into(),
            ty,
            default: None,
            constraints: Vec::new(),
        })
    }

    /// Declare a field that falls back to `default` when absent from
    /// construction data.
    pub fn field_with_default(
        self,
        name: impl Into<String>,
        ty: FieldType,
        default: impl Into<KvTree>,
    ) -> Self {
        self.push(Field {
            name: name.into(),
            ty,
            default: Some(default.into()),
            constraints: Vec::new(),
        })
    }

    /// Attach a constraint to the most recently declared field.
    ///
    /// Has no effect if no field has been declared yet.
    pub fn constrained<C: Constraint + 'static>(mut self, constraint: C) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.constraints.push(Arc::new(constraint));
        }
        self
    }

    /// Finish the schema.
    pub fn build(self) -> Arc<ModelSchema> {
        Arc::new(ModelSchema {
            name: self.name,
            fields: self.fields,
        })
    }

    fn push(mut self, field: Field) -> Self {
        match self.fields.iter().position(|f| f.name == field.name) {
            Some(index) => self.fields[index] = field,
            None => self.fields.push(field),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn font() -> Arc<ModelSchema> {
        ModelSchema::builder("Font")
            .field("size", FieldType::Integer)
            .build()
    }

    #[test]
    fn test_primitive_acceptance() {
        assert!(FieldType::Bool.accepts(&Value::Bool(true)));
        assert!(FieldType::Integer.accepts(&Value::Integer(3)));
        assert!(!FieldType::Integer.accepts(&Value::Float(3.0)));
        assert!(!FieldType::Float.accepts(&Value::Integer(3)));
        assert!(FieldType::String.accepts(&Value::from("x")));
        assert!(!FieldType::String.accepts(&Value::Null));
        assert!(FieldType::Any.accepts(&Value::Null));
    }

    #[test]
    fn test_container_acceptance() {
        let list = FieldType::list(FieldType::Integer);
        assert!(list.accepts(&Value::from(vec![1i64, 2, 3])));
        assert!(!list.accepts(&Value::List(vec![Value::Integer(1), Value::from("2")])));

        let optional = FieldType::optional(FieldType::String);
        assert!(optional.accepts(&Value::Null));
        assert!(optional.accepts(&Value::from("x")));
        assert!(!optional.accepts(&Value::Bool(false)));
    }

    #[test]
    fn test_model_acceptance_uses_schema_handle() {
        let schema = font();
        let lookalike = font();
        let model = crate::core::Model::from_kv(&schema, &serde_json::json!({"size": 1})).unwrap();

        assert!(FieldType::model(&schema).accepts(&Value::Model(model.clone())));
        assert!(!FieldType::model(&lookalike).accepts(&Value::Model(model)));
    }

    #[test]
    fn test_builder_keeps_declaration_order() {
        let schema = ModelSchema::builder("App")
            .field("b", FieldType::String)
            .field("a", FieldType::Integer)
            .field("b", FieldType::Bool)
            .build();

        assert_eq!(schema.field_names().collect::<Vec<_>>(), ["b", "a"]);
        assert!(matches!(schema.field("b").unwrap().ty(), FieldType::Bool));
        assert_eq!(schema.index_of("a"), Some(1));
        assert!(!schema.has_field("c"));
    }

    #[test]
    fn test_constraint_failure_is_type_mismatch() {
        let schema = ModelSchema::builder("Server")
            .field("port", FieldType::Integer)
            .constrained(|value: &Value| match value.as_i64() {
                Some(port) if port >= 1024 => Ok(()),
                _ => Err(ValidationError::invalid_field("port", "must be >= 1024")),
            })
            .build();
        let field = schema.field("port").unwrap();

        assert!(field.check("port", &Value::Integer(8080)).is_ok());
        match field.check("port", &Value::Integer(80)) {
            Err(ConfigError::TypeMismatch { field, reason }) => {
                assert_eq!(field, "port");
                assert!(reason.contains("must be >= 1024"));
            }
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_display() {
        let ty = FieldType::map(FieldType::list(FieldType::model(&font())));
        assert_eq!(ty.to_string(), "map<list<Font>>");
    }
}
