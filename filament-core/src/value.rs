//! Dynamic Value Model
//!
//! The reactive store and the virtual tree both operate on loosely shaped
//! data: property bags whose fields are scalars, lists, or nested objects.
//! `Value` is that shape, and `Obj` is the shared, identity-carrying object
//! handle the reactive system keys its bookkeeping on.
//!
//! # Equality
//!
//! `Value` equality mirrors strict equality in the embedding model:
//!
//! - scalars and strings compare by content,
//! - lists and objects compare by *handle identity* (two independently built
//!   lists with equal contents are not equal).
//!
//! This is the comparison used to suppress redundant writes, so assigning a
//! field the very same list/object handle is a no-op while assigning a fresh
//! one notifies subscribers.
//!
//! # Identity
//!
//! Every `Obj` carries a process-unique `id`. The dependency registry is
//! keyed by that id, and the backing record purges its registry entries when
//! the last handle drops, so discarded state does not pin bookkeeping.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Counter for generating unique object IDs.
static OBJ_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_obj_id() -> u64 {
    OBJ_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A dynamically typed value: the field type of reactive objects and the
/// property type of virtual nodes.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Immutable list snapshot, cheap to clone, compared by handle identity.
    List(Arc<Vec<Value>>),
    /// Shared object handle, compared by identity.
    Object(Obj),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Obj> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Render the value as display text, the way a text binding would.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(o) => format!("[object #{}]", o.id()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a.same(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }
}

impl From<Obj> for Value {
    fn from(o: Obj) -> Self {
        Value::Object(o)
    }
}

/// A shared handle to a mutable property bag.
///
/// Cloning a handle shares the underlying record; equality between handles is
/// identity. An `Obj` starts out plain — see
/// [`make_reactive`](crate::reactive::make_reactive) for opting a handle into
/// dependency tracking.
pub struct Obj {
    data: Arc<ObjData>,
}

pub(crate) struct ObjData {
    id: u64,
    /// Set once by `make_reactive`; reads/writes only participate in
    /// tracking/triggering while this is set.
    reactive: AtomicBool,
    fields: RwLock<IndexMap<String, Value>>,
}

impl Drop for ObjData {
    fn drop(&mut self) {
        // Last handle gone: release the dependency entries registered under
        // this object's id so the registry cannot accumulate dead targets.
        crate::reactive::dep::purge_target(self.id);
    }
}

impl Obj {
    /// Create an empty object.
    pub fn new() -> Self {
        Self {
            data: Arc::new(ObjData {
                id: next_obj_id(),
                reactive: AtomicBool::new(false),
                fields: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Stable process-unique identity of the underlying record.
    pub fn id(&self) -> u64 {
        self.data.id
    }

    /// Identity comparison: do both handles share one record?
    pub fn same(&self, other: &Obj) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    pub(crate) fn is_reactive_flag(&self) -> bool {
        self.data.reactive.load(Ordering::Acquire)
    }

    pub(crate) fn mark_reactive(&self) {
        self.data.reactive.store(true, Ordering::Release);
    }

    /// Plain write used while building up state. Never notifies subscribers;
    /// use [`Obj::set`](crate::reactive) on a reactive object for tracked
    /// mutation.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.fields.write().insert(key.into(), value.into());
    }

    /// Read a field without establishing a dependency.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.data
            .fields
            .read()
            .get(key)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.fields.read().contains_key(key)
    }

    /// Snapshot of the field names, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.data.fields.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.data.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.fields.read().is_empty()
    }

    pub(crate) fn with_fields<R>(&self, f: impl FnOnce(&mut IndexMap<String, Value>) -> R) -> R {
        f(&mut self.data.fields.write())
    }
}

impl Default for Obj {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Obj {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Obj {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let obj = Obj::new();
        for (k, v) in iter {
            obj.insert(k, v);
        }
        obj
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obj")
            .field("id", &self.id())
            .field("reactive", &self.is_reactive_flag())
            .field("fields", &*self.data.fields.read())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// JSON interop
// ----------------------------------------------------------------------------

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(Arc::new(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => items.as_ref().serialize(serializer),
            Value::Object(o) => {
                // Serialize a snapshot of the fields. Cyclic object graphs
                // are the caller's responsibility.
                let fields = o.data.fields.read();
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON-shaped value")
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_bool<E>(self, b: bool) -> Result<Value, E> {
                Ok(Value::Bool(b))
            }

            fn visit_i64<E>(self, n: i64) -> Result<Value, E> {
                Ok(Value::Int(n))
            }

            fn visit_u64<E>(self, n: u64) -> Result<Value, E> {
                Ok(Value::Int(n as i64))
            }

            fn visit_f64<E>(self, f: f64) -> Result<Value, E> {
                Ok(Value::Float(f))
            }

            fn visit_str<E>(self, s: &str) -> Result<Value, E> {
                Ok(Value::Str(s.to_owned()))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::List(Arc::new(items)))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
                let obj = Obj::new();
                while let Some((k, v)) = map.next_entry::<String, Value>()? {
                    obj.insert(k, v);
                }
                Ok(Value::Object(obj))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
