//! Model descriptors and live entities.

use std::fmt;
use std::marker::PhantomData;

use riakpersist_client::{StoreError, StoreObject, VERSION_FIELD};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::migration::{Direction, MigrateFn};

/// Static description of a stored model.
///
/// # Example
///
/// ```
/// use riakpersist::{Direction, MigrateFn, MigrationError, Model};
/// use riakpersist_client::StoreObject;
///
/// struct Contact;
///
/// fn stamp_v1(mut object: StoreObject) -> Result<StoreObject, MigrationError> {
///     object.set_data_version(1);
///     Ok(object)
/// }
///
/// impl Model for Contact {
///     const VERSION: u32 = 1;
///     const MODEL_NAME: &'static str = "app.Contact";
///     const BUCKET: &'static str = "contact";
///
///     fn migrator(from: u32, direction: Direction) -> Option<MigrateFn> {
///         match (direction, from) {
///             (Direction::Forward, 0) => Some(stamp_v1 as MigrateFn),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Model: Send + Sync + 'static {
    /// Current schema version.
    const VERSION: u32;

    /// Fully-qualified name, the key of the `store_versions` table.
    const MODEL_NAME: &'static str;

    /// Bucket name without the manager's prefix.
    const BUCKET: &'static str;

    /// The migrator moving a record away from version `from`.
    fn migrator(from: u32, direction: Direction) -> Option<MigrateFn> {
        let _ = (from, direction);
        None
    }
}

/// A live record of model `M`, at the model's current version.
pub struct Entity<M> {
    object: StoreObject,
    was_migrated: bool,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Entity<M> {
    pub(crate) fn new(object: StoreObject, was_migrated: bool) -> Self {
        Self {
            object,
            was_migrated,
            _model: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        self.object.key()
    }

    pub fn bucket(&self) -> &str {
        self.object.bucket()
    }

    /// Whether any migration ran when this entity was loaded.
    pub fn was_migrated(&self) -> bool {
        self.was_migrated
    }

    pub fn object(&self) -> &StoreObject {
        &self.object
    }

    pub fn object_mut(&mut self) -> &mut StoreObject {
        &mut self.object
    }

    pub fn into_object(self) -> StoreObject {
        self.object
    }

    pub fn version(&self) -> Option<u32> {
        self.object.data_version()
    }

    // === Fields ===

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.object.fields().and_then(|fields| fields.get(field))
    }

    /// Set a data field. Does nothing unless the payload is a mapping.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        if let Some(fields) = self.object.fields_mut() {
            fields.insert(field.into(), value.into());
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.object.fields_mut().and_then(|fields| fields.remove(field))
    }

    /// Deserialize the data fields, `$VERSION` included.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self.object.data().cloned().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| StoreError::from(e).into())
    }

    /// Replace the data fields with `value`, stamped with the current version.
    pub fn encode<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let mut fields = match serde_json::to_value(value).map_err(StoreError::from)? {
            Value::Object(fields) => fields,
            other => {
                return Err(StoreError::InvalidRequest {
                    message: format!("{} data must be a mapping, got {}", M::MODEL_NAME, other),
                }
                .into())
            }
        };
        fields.insert(VERSION_FIELD.to_string(), Value::from(M::VERSION));
        self.object.set_data(Value::Object(fields));
        Ok(())
    }

    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.object.fields()
    }

    // === Indexes ===

    pub fn add_index(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.object.add_index(name, value);
    }

    pub fn remove_index(&mut self, name: &str, value: Option<&str>) {
        self.object.remove_index(name, value);
    }

    pub fn index_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.object.index_values(name)
    }
}

impl<M> Clone for Entity<M> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            was_migrated: self.was_migrated,
            _model: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for Entity<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &M::MODEL_NAME)
            .field("object", &self.object)
            .field("was_migrated", &self.was_migrated)
            .finish()
    }
}
