//! Observable models: typed records whose field writes notify subscribers.

use crate::core::root::RootState;
use crate::core::{FieldType, ModelSchema, RootModel, Value};
use crate::error::{ConfigError, Result};
use crate::notify::{Callback, SubscriptionRegistry};
use crate::sources::KvTree;
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// Non-owning link from a node to its tree root.
pub(crate) type RootLink = Option<Weak<ModelInner>>;

pub(crate) struct ModelInner {
    schema: Arc<ModelSchema>,
    values: RwLock<Vec<Value>>,
    subscribers: Mutex<SubscriptionRegistry>,
    pub(crate) kind: NodeKind,
}

pub(crate) enum NodeKind {
    Root(RootState),
    /// Set at most once, when the child is built inside a tree or first
    /// assigned into one.
    Child(OnceLock<Weak<ModelInner>>),
}

/// Handle to an observable configuration node.
///
/// Cloning is cheap and yields another handle to the same node. Field writes
/// go through [`Model::set_field`], which checks the declared type, stores the
/// value and synchronously notifies the field's subscribers when the value
/// changed.
///
/// # Examples
///
/// ```rust
/// use reactive_config::core::{FieldType, Model, ModelSchema};
/// use reactive_config::notify::Callback;
/// use serde_json::json;
///
/// let schema = ModelSchema::builder("Theme")
///     .field("color", FieldType::String)
///     .build();
/// let theme = Model::from_kv(&schema, &json!({"color": "red"}))?;
///
/// let callback = Callback::new(|value| println!("color is now {:?}", value));
/// theme.subscribe("color", &callback)?;
/// theme.set_field("color", "blue")?;
/// # Ok::<(), reactive_config::error::ConfigError>(())
/// ```
#[derive(Clone)]
pub struct Model {
    pub(crate) inner: Arc<ModelInner>,
}

impl Model {
    /// Build a detached node from a key-value tree.
    ///
    /// The node and its nested children get a root link the first time the
    /// node is assigned into a tree.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not an object, a required field is missing,
    /// or a value does not satisfy its field.
    pub fn from_kv(schema: &Arc<ModelSchema>, raw: &KvTree) -> Result<Self> {
        Self::build_child(schema, raw, None, "")
    }

    pub(crate) fn build_child(
        schema: &Arc<ModelSchema>,
        raw: &KvTree,
        link: RootLink,
        path: &str,
    ) -> Result<Self> {
        let values = build_values(schema, raw, &link, path)?;
        let cell = OnceLock::new();
        if let Some(root) = link {
            let _ = cell.set(root);
        }
        Ok(Self::from_parts(schema, values, NodeKind::Child(cell)))
    }

    pub(crate) fn build_root(
        schema: &Arc<ModelSchema>,
        raw: &KvTree,
        state: RootState,
    ) -> Result<Self> {
        let model = Self::from_parts(schema, Vec::new(), NodeKind::Root(state));
        let link = Some(Arc::downgrade(&model.inner));
        let values = build_values(schema, raw, &link, "")?;
        *model.inner.values.write() = values;
        Ok(model)
    }

    fn from_parts(schema: &Arc<ModelSchema>, values: Vec<Value>, kind: NodeKind) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                schema: Arc::clone(schema),
                values: RwLock::new(values),
                subscribers: Mutex::new(SubscriptionRegistry::new()),
                kind,
            }),
        }
    }

    /// The schema this node was built from.
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.inner.schema
    }

    /// Returns true if both handles point at the same node.
    pub fn ptr_eq(a: &Model, b: &Model) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Returns true if this node is a tree root.
    pub fn is_root(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Root(_))
    }

    /// The root of the tree this node belongs to.
    ///
    /// A root returns itself. Returns `None` for a detached node or when the
    /// root has been dropped.
    pub fn root(&self) -> Option<RootModel> {
        match &self.inner.kind {
            NodeKind::Root(_) => Some(RootModel::from_model(self.clone())),
            NodeKind::Child(link) => link
                .get()
                .and_then(Weak::upgrade)
                .map(|inner| RootModel::from_model(Model { inner })),
        }
    }

    pub(crate) fn root_link(&self) -> RootLink {
        match &self.inner.kind {
            NodeKind::Root(_) => Some(Arc::downgrade(&self.inner)),
            NodeKind::Child(link) => link.get().cloned(),
        }
    }

    /// Current value of a field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownField`] if `name` is not declared.
    pub fn get(&self, name: &str) -> Result<Value> {
        let index = self.index_of(name)?;
        Ok(self.inner.values.read()[index].clone())
    }

    /// Nested model stored in a field, if the field currently holds one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownField`] if `name` is not declared.
    pub fn child(&self, name: &str) -> Result<Option<Model>> {
        Ok(self.get(name)?.as_model().cloned())
    }

    /// Assign a field.
    ///
    /// The value must satisfy the field's declared type and constraints, or the
    /// write is rejected and the previous value kept. When the stored value
    /// differs from the previous one, every subscriber of the field runs on the
    /// calling thread with no lock held; a panicking subscriber is logged and
    /// the rest still run. The tree root then auto-saves if enabled.
    ///
    /// Assigning a new nested model replaces the old one whole; the old node's
    /// subscribers are not carried over.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnknownField`] if `name` is not declared
    /// - [`ConfigError::TypeMismatch`] if the value is rejected
    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let index = self.index_of(name)?;
        self.inner.schema.fields()[index].check(name, &value)?;
        reject_nested_roots(name, &value)?;

        if let Some(root) = self.root_link() {
            adopt(&value, &root);
        }

        let previous = {
            let mut values = self.inner.values.write();
            std::mem::replace(&mut values[index], value.clone())
        };
        if previous == value {
            return Ok(());
        }

        self.notify(name, &value);
        if let Some(root) = self.root() {
            root.save_after_mutation();
        }
        Ok(())
    }

    fn notify(&self, name: &str, value: &Value) {
        let callbacks = self.inner.subscribers.lock().snapshot(name);
        for callback in callbacks {
            callback.invoke(name, value);
        }
    }

    /// Subscribe `callback` to changes of `name`.
    ///
    /// Subscribing the same callback twice registers it once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownField`] if `name` is not declared.
    pub fn subscribe(&self, name: &str, callback: &Callback) -> Result<()> {
        self.index_of(name)?;
        self.inner.subscribers.lock().add(name, callback.clone());
        Ok(())
    }

    /// Wrap `func` in a [`Callback`], subscribe it, and return the handle.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownField`] if `name` is not declared.
    pub fn on_change<F>(&self, name: &str, func: F) -> Result<Callback>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let callback = Callback::new(func);
        self.subscribe(name, &callback)?;
        Ok(callback)
    }

    /// Remove `callback` from `name`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnknownField`] if `name` is not declared
    /// - [`ConfigError::NotSubscribed`] if `callback` was not subscribed to `name`
    pub fn unsubscribe(&self, name: &str, callback: &Callback) -> Result<()> {
        self.index_of(name)?;
        if self.inner.subscribers.lock().remove(name, callback) {
            Ok(())
        } else {
            Err(ConfigError::NotSubscribed {
                field: name.to_string(),
            })
        }
    }

    /// Subscribe several callbacks.
    ///
    /// Every entry is attempted in order. Entries that succeed stay applied;
    /// the failures are returned together as [`ConfigError::Multiple`] in
    /// entry order.
    pub fn subscribe_many<'a, I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a Callback)>,
    {
        collect_errors(
            entries
                .into_iter()
                .map(|(name, callback)| self.subscribe(name, callback)),
        )
    }

    /// Unsubscribe several callbacks, with the same reporting as
    /// [`Model::subscribe_many`].
    pub fn unsubscribe_many<'a, I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a Callback)>,
    {
        collect_errors(
            entries
                .into_iter()
                .map(|(name, callback)| self.unsubscribe(name, callback)),
        )
    }

    /// Number of callbacks subscribed to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownField`] if `name` is not declared.
    pub fn subscriber_count(&self, name: &str) -> Result<usize> {
        self.index_of(name)?;
        Ok(self.inner.subscribers.lock().subscriber_count(name))
    }

    /// Returns true if `callback` is subscribed to `name`.
    pub fn is_subscribed(&self, name: &str, callback: &Callback) -> bool {
        self.inner.subscribers.lock().contains(name, callback)
    }

    /// Plain key-value tree of the current field values, recursing into
    /// nested models. Keys follow declaration order.
    pub fn dump(&self) -> KvTree {
        let values = self.inner.values.read().clone();
        let entries = self
            .inner
            .schema
            .fields()
            .iter()
            .zip(values.iter())
            .map(|(field, value)| (field.name().to_string(), value.to_kv()))
            .collect();
        KvTree::Object(entries)
    }

    /// Apply a key-value tree onto this node field by field.
    ///
    /// Keys that are not declared are ignored and absent fields keep their
    /// value. Where a field already holds a nested model and `raw` carries an
    /// object for it, the update recurses into that node so its subscribers
    /// are kept. Every other field goes through [`Model::set_field`].
    ///
    /// The whole tree is checked before anything is applied, so a rejected
    /// update leaves every field untouched and fires no subscriber.
    ///
    /// # Errors
    ///
    /// Returns the first type, constraint or shape error found in `raw`.
    pub fn update_from(&self, raw: &KvTree) -> Result<()> {
        self.check_update(raw, "")?;
        self.apply_update(raw)
    }

    fn check_update(&self, raw: &KvTree, path: &str) -> Result<()> {
        let entries = self.update_entries(raw, path)?;

        for field in self.inner.schema.fields() {
            let Some(raw_value) = entries.get(field.name()) else {
                continue;
            };
            let field_path = join_path(path, field.name());

            if field.ty().model_schema().is_some() && raw_value.is_object() {
                if let Some(child) = self.child(field.name())? {
                    child.check_update(raw_value, &field_path)?;
                    continue;
                }
            }

            // Built detached, then dropped.
            let value = construct_value(field.ty(), &field_path, raw_value, &None)?;
            field.check(&field_path, &value)?;
        }
        Ok(())
    }

    fn apply_update(&self, raw: &KvTree) -> Result<()> {
        let entries = self.update_entries(raw, "")?;
        let link = self.root_link();

        for field in self.inner.schema.fields() {
            let Some(raw_value) = entries.get(field.name()) else {
                continue;
            };

            if field.ty().model_schema().is_some() && raw_value.is_object() {
                if let Some(child) = self.child(field.name())? {
                    child.apply_update(raw_value)?;
                    continue;
                }
            }

            let value = construct_value(field.ty(), field.name(), raw_value, &link)?;
            self.set_field(field.name(), value)?;
        }
        Ok(())
    }

    fn update_entries<'a>(
        &self,
        raw: &'a KvTree,
        path: &str,
    ) -> Result<&'a serde_json::Map<String, KvTree>> {
        match raw {
            KvTree::Object(entries) => Ok(entries),
            other => Err(ConfigError::type_mismatch(
                if path.is_empty() { self.inner.schema.name() } else { path },
                format!("expected object, found {}", kv_kind(other)),
            )),
        }
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.inner
            .schema
            .index_of(name)
            .ok_or_else(|| ConfigError::UnknownField {
                model: self.inner.schema.name().to_string(),
                field: name.to_string(),
            })
    }

    /// Set the root link on a detached node and its detached descendants.
    fn attach(&self, root: &Weak<ModelInner>) {
        let NodeKind::Child(link) = &self.inner.kind else {
            return;
        };
        if link.set(root.clone()).is_ok() {
            let values = self.inner.values.read().clone();
            for value in &values {
                adopt(value, root);
            }
        }
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        if Model::ptr_eq(self, other) {
            return true;
        }
        if !Arc::ptr_eq(&self.inner.schema, &other.inner.schema) {
            return false;
        }
        let ours = self.inner.values.read().clone();
        let theirs = other.inner.values.read().clone();
        ours == theirs
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.inner.values.read().clone();
        let mut out = f.debug_struct(self.inner.schema.name());
        for (field, value) in self.inner.schema.fields().iter().zip(values.iter()) {
            out.field(field.name(), value);
        }
        out.finish()
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.dump().serialize(serializer)
    }
}

fn adopt(value: &Value, root: &Weak<ModelInner>) {
    match value {
        Value::Model(model) => model.attach(root),
        Value::List(items) => items.iter().for_each(|item| adopt(item, root)),
        Value::Map(entries) => entries.values().for_each(|item| adopt(item, root)),
        _ => {}
    }
}

fn reject_nested_roots(path: &str, value: &Value) -> Result<()> {
    match value {
        Value::Model(model) if model.is_root() => Err(ConfigError::type_mismatch(
            path,
            "a root model cannot be nested inside another tree",
        )),
        Value::List(items) => items.iter().try_for_each(|item| reject_nested_roots(path, item)),
        Value::Map(entries) => entries
            .values()
            .try_for_each(|item| reject_nested_roots(path, item)),
        _ => Ok(()),
    }
}

fn collect_errors(results: impl Iterator<Item = Result<()>>) -> Result<()> {
    let errors: Vec<ConfigError> = results.filter_map(|r| r.err()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Multiple(errors))
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn kv_kind(raw: &KvTree) -> &'static str {
    match raw {
        KvTree::Null => "null",
        KvTree::Bool(_) => "bool",
        KvTree::Number(n) if n.is_f64() => "float",
        KvTree::Number(_) => "integer",
        KvTree::String(_) => "string",
        KvTree::Array(_) => "list",
        KvTree::Object(_) => "object",
    }
}

fn build_values(
    schema: &Arc<ModelSchema>,
    raw: &KvTree,
    link: &RootLink,
    path: &str,
) -> Result<Vec<Value>> {
    let KvTree::Object(entries) = raw else {
        return Err(ConfigError::type_mismatch(
            if path.is_empty() { schema.name() } else { path },
            format!("expected object, found {}", kv_kind(raw)),
        ));
    };

    for key in entries.keys().filter(|key| !schema.has_field(key)) {
        tracing::debug!(model = schema.name(), key = %key, "ignoring undeclared key");
    }

    schema
        .fields()
        .iter()
        .map(|field| {
            let field_path = join_path(path, field.name());
            let value = match (entries.get(field.name()), field.default_value()) {
                (Some(raw_value), _) | (None, Some(raw_value)) => {
                    construct_value(field.ty(), &field_path, raw_value, link)?
                }
                (None, None) if matches!(field.ty(), FieldType::Optional(_)) => Value::Null,
                (None, None) => {
                    return Err(ConfigError::MissingField {
                        model: schema.name().to_string(),
                        field: field_path,
                    });
                }
            };
            field.check(&field_path, &value)?;
            Ok(value)
        })
        .collect()
}

/// Build a field value of type `ty` from raw data, creating nested models
/// linked to `link`.
pub(crate) fn construct_value(
    ty: &FieldType,
    path: &str,
    raw: &KvTree,
    link: &RootLink,
) -> Result<Value> {
    match (ty, raw) {
        (FieldType::Any, raw) => Ok(Value::from_kv_untyped(raw)),
        (FieldType::Optional(_), KvTree::Null) => Ok(Value::Null),
        (FieldType::Optional(inner), raw) => construct_value(inner, path, raw, link),
        (FieldType::Bool, KvTree::Bool(b)) => Ok(Value::Bool(*b)),
        (FieldType::Integer, KvTree::Number(n)) if n.as_i64().is_some() => {
            Ok(Value::Integer(n.as_i64().unwrap_or_default()))
        }
        (FieldType::Float, KvTree::Number(n)) => {
            Ok(Value::Float(n.as_f64().unwrap_or(f64::NAN)))
        }
        (FieldType::String, KvTree::String(s)) => Ok(Value::String(s.clone())),
        (FieldType::List(inner), KvTree::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| construct_value(inner, &format!("{}[{}]", path, i), item, link))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        (FieldType::Map(inner), KvTree::Object(entries)) => entries
            .iter()
            .map(|(key, item)| {
                construct_value(inner, &join_path(path, key), item, link)
                    .map(|value| (key.clone(), value))
            })
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Value::Map),
        (FieldType::Model(schema), KvTree::Object(_)) => {
            Model::build_child(schema, raw, link.clone(), path).map(Value::Model)
        }
        (expected, found) => Err(ConfigError::type_mismatch(
            path,
            format!("expected {}, found {}", expected, kv_kind(found)),
        )),
    }
}
