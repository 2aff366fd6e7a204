//! The subdir entry type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the only field the index interprets.
pub const ID_FIELD: &str = "id";

/// A single entry in the index.
///
/// Only `id` carries meaning. Any other fields found in the file are kept in
/// `extra` and written back unchanged, so entries stay extensible without the
/// store having to know their shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subdir {
    /// Unique, opaque identifier of the entry.
    pub id: String,
    /// Fields the index does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Subdir {
    /// Create an entry with no extra fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: Map::new(),
        }
    }

    /// Attach an extra field. The `id` key is reserved and ignored here.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != ID_FIELD {
            self.extra.insert(key, value.into());
        }
        self
    }

    /// Look up an extra field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Build an entry from one element of the `subdirs` array.
    ///
    /// Returns `None` for elements that are not objects or that carry no
    /// string `id`; such elements are dropped rather than rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        match fields.remove(ID_FIELD) {
            Some(Value::String(id)) => Some(Self { id, extra: fields }),
            _ => None,
        }
    }
}
