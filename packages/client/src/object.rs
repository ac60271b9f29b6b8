//! The record wrapper - one stored object plus its metadata.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::client::StoreClient;
use crate::error::{Result, StoreError};

/// Reserved data field holding the schema version of a record.
pub const VERSION_FIELD: &str = "$VERSION";

/// Content type used for structured records.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Payload of a [`StoreObject`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// Nothing stored (yet), or the last reload found no record.
    #[default]
    Missing,

    /// Encoded bytes as they came off the wire.
    Encoded(Bytes),

    /// Decoded structured data.
    Data(Value),
}

/// A raw result as fetched from the store, before it is bound to a key.
///
/// This is also the shape of pre-fetched results handed to a load, for
/// example the values carried in map-reduce rows:
///
/// ```json
/// {"metadata": {"content-type": "application/json", "index": [["name_bin", "x"]]},
///  "data": "{\"$VERSION\": 1}"}
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub content_type: String,
    pub indexes: Vec<(String, String)>,
    pub data: Bytes,
}

impl RawResult {
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            indexes: Vec::new(),
            data: data.into(),
        }
    }

    /// Build a JSON result from a structured value.
    pub fn json(data: &Value) -> Result<Self> {
        Ok(Self::new(JSON_CONTENT_TYPE, serde_json::to_vec(data)?))
    }

    pub fn with_index(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.indexes.push((name.into(), value.into()));
        self
    }

    /// Parse a raw JSON result.
    ///
    /// The store reports index metadata as a list of pairs in some responses
    /// and as a mapping in others. Both are flattened into one ordered list
    /// of pairs here; any other shape is a storage error.
    pub fn from_json(result: &Value) -> Result<Self> {
        let metadata = result
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| StoreError::invalid_response("result has no metadata mapping"))?;

        let content_type = metadata
            .get("content-type")
            .and_then(Value::as_str)
            .unwrap_or(JSON_CONTENT_TYPE)
            .to_string();

        let indexes = match metadata.get("index") {
            None | Some(Value::Null) => Vec::new(),
            Some(index) => normalize_indexes(index)?,
        };

        let data = match result.get("data") {
            None | Some(Value::Null) => Bytes::new(),
            Some(Value::String(s)) => Bytes::from(s.clone().into_bytes()),
            Some(other) => Bytes::from(serde_json::to_vec(other)?),
        };

        Ok(Self {
            content_type,
            indexes,
            data,
        })
    }
}

fn index_value(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(StoreError::invalid_index(format!(
            "unsupported value {} for index {}",
            other, name
        ))),
    }
}

fn normalize_indexes(index: &Value) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    match index {
        Value::Object(map) => {
            for (name, value) in map {
                match value {
                    Value::Array(values) => {
                        for v in values {
                            pairs.push((name.clone(), index_value(name, v)?));
                        }
                    }
                    v => pairs.push((name.clone(), index_value(name, v)?)),
                }
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                match entry.as_array().map(Vec::as_slice) {
                    Some([Value::String(name), value]) => {
                        pairs.push((name.clone(), index_value(name, value)?));
                    }
                    _ => {
                        return Err(StoreError::invalid_index(format!(
                            "expected [name, value] pair, got {}",
                            entry
                        )))
                    }
                }
            }
        }
        other => {
            return Err(StoreError::invalid_index(format!(
                "expected list or mapping, got {}",
                other
            )))
        }
    }
    Ok(pairs)
}

/// One stored record: bucket, key, content type, secondary indexes and payload.
///
/// The network primitives (`store`, `reload`, `delete`) are blocking and take
/// the client explicitly, so a `StoreObject` can be moved by value onto a
/// worker thread and back.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreObject {
    bucket: String,
    key: String,
    content_type: String,
    indexes: BTreeSet<(String, String)>,
    payload: Payload,
}

impl StoreObject {
    /// An empty object with no payload.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            indexes: BTreeSet::new(),
            payload: Payload::Missing,
        }
    }

    /// A fresh JSON object at the given schema version.
    pub fn versioned(bucket: impl Into<String>, key: impl Into<String>, version: u32) -> Self {
        let mut object = Self::new(bucket, key);
        let mut data = Map::new();
        data.insert(VERSION_FIELD.to_string(), Value::from(version));
        object.payload = Payload::Data(Value::Object(data));
        object
    }

    /// An object populated from a raw result.
    pub fn from_raw(bucket: impl Into<String>, key: impl Into<String>, raw: RawResult) -> Self {
        let mut object = Self::new(bucket, key);
        object.apply_raw(raw);
        object
    }

    fn apply_raw(&mut self, raw: RawResult) {
        self.content_type = raw.content_type;
        self.indexes = raw.indexes.into_iter().collect();
        self.payload = Payload::Encoded(raw.data);
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    // === Indexes ===

    pub fn indexes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.indexes.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Values of one index, in order.
    pub fn index_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.indexes
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_indexes<I, N, V>(&mut self, indexes: I)
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        self.indexes = indexes
            .into_iter()
            .map(|(n, v)| (n.into(), v.into()))
            .collect();
    }

    pub fn add_index(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.indexes.insert((name.into(), value.into()));
    }

    /// Remove one index entry, or every entry of the index when `value` is `None`.
    pub fn remove_index(&mut self, name: &str, value: Option<&str>) {
        self.indexes
            .retain(|(n, v)| n != name || value.is_some_and(|value| v != value));
    }

    // === Payload ===

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn set_encoded_data(&mut self, data: impl Into<Bytes>) {
        self.payload = Payload::Encoded(data.into());
    }

    pub fn set_data(&mut self, data: Value) {
        self.payload = Payload::Data(data);
    }

    /// Whether the object carries any data. JSON `null` counts as none.
    pub fn has_data(&self) -> bool {
        match &self.payload {
            Payload::Missing => false,
            Payload::Encoded(bytes) => !bytes.is_empty(),
            Payload::Data(value) => !value.is_null(),
        }
    }

    /// Decode an encoded JSON payload in place.
    ///
    /// Only JSON content types are decodable; anything else is left encoded
    /// and reported as an encoding error.
    pub fn decode(&mut self) -> Result<()> {
        let Payload::Encoded(bytes) = &self.payload else {
            return Ok(());
        };
        if !self.content_type.starts_with(JSON_CONTENT_TYPE) {
            return Err(StoreError::Encoding {
                content_type: self.content_type.clone(),
            });
        }
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(bytes)?
        };
        self.payload = Payload::Data(value);
        Ok(())
    }

    /// Decoded data, if the payload has been decoded.
    pub fn data(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut Value> {
        match &mut self.payload {
            Payload::Data(value) => Some(value),
            _ => None,
        }
    }

    /// Decoded data as a field mapping.
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.data().and_then(Value::as_object)
    }

    pub fn fields_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.data_mut().and_then(Value::as_object_mut)
    }

    /// Schema version of the decoded data.
    ///
    /// A missing or null `$VERSION` is version 0. `None` when there is no
    /// decoded mapping, or when `$VERSION` is not an unsigned 32-bit integer;
    /// see [`StoreObject::version_value`] for the raw field.
    pub fn data_version(&self) -> Option<u32> {
        match self.version_value() {
            None | Some(Value::Null) => self.fields().map(|_| 0),
            Some(value) => value.as_u64().and_then(|v| u32::try_from(v).ok()),
        }
    }

    /// The raw `$VERSION` field, if the decoded data has one.
    pub fn version_value(&self) -> Option<&Value> {
        self.fields()?.get(VERSION_FIELD)
    }

    /// Stamp the decoded data with a schema version.
    ///
    /// Does nothing unless the payload is a decoded mapping.
    pub fn set_data_version(&mut self, version: u32) {
        if let Some(fields) = self.fields_mut() {
            fields.insert(VERSION_FIELD.to_string(), Value::from(version));
        }
    }

    /// The payload as wire bytes, serializing decoded data if needed.
    pub fn encoded_data(&self) -> Result<Bytes> {
        match &self.payload {
            Payload::Missing => Ok(Bytes::new()),
            Payload::Encoded(bytes) => Ok(bytes.clone()),
            Payload::Data(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
        }
    }

    /// The object as a raw result, as it would be written to the store.
    pub fn to_raw(&self) -> Result<RawResult> {
        Ok(RawResult {
            content_type: self.content_type.clone(),
            indexes: self.indexes.iter().cloned().collect(),
            data: self.encoded_data()?,
        })
    }

    // === Methods that touch the network ===

    pub fn store(&self, client: &dyn StoreClient) -> Result<()> {
        client.store(self)
    }

    /// Refresh from the store. Returns `false` when no record exists, in
    /// which case the payload and indexes are cleared.
    pub fn reload(&mut self, client: &dyn StoreClient) -> Result<bool> {
        match client.fetch(&self.bucket, &self.key)? {
            Some(raw) => {
                self.apply_raw(raw);
                Ok(true)
            }
            None => {
                self.indexes.clear();
                self.payload = Payload::Missing;
                Ok(false)
            }
        }
    }

    pub fn delete(&self, client: &dyn StoreClient) -> Result<()> {
        client.delete(&self.bucket, &self.key)
    }
}
