//! Models and helpers shared by the manager integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use riakpersist::{AsyncManager, Direction, ManagerConfig, MigrateFn, MigrationError, Model};
use riakpersist_client::{MemoryClient, RawResult, StoreObject};
use serde_json::{json, Map, Value};

pub const PREFIX: &str = "test.";
pub const CONTACT_BUCKET: &str = "test.contact";

/// Version history:
///
/// - 0: `{"name": ...}` without a version field
/// - 1: `{"$VERSION": 1, "name": ...}`
/// - 2: `name` renamed to `full_name`
/// - 3: `tags` added, `full_name_bin` index maintained
pub struct Contact;

fn contact_fields(object: &mut StoreObject) -> Result<&mut Map<String, Value>, MigrationError> {
    object
        .fields_mut()
        .ok_or_else(|| MigrationError::invalid("contact data is not a mapping"))
}

fn rename(object: &mut StoreObject, from: &str, to: &str) -> Result<(), MigrationError> {
    let fields = contact_fields(object)?;
    if let Some(value) = fields.remove(from) {
        fields.insert(to.to_string(), value);
    }
    Ok(())
}

fn contact_0_to_1(mut object: StoreObject) -> Result<StoreObject, MigrationError> {
    object.set_data_version(1);
    Ok(object)
}

fn contact_1_to_2(mut object: StoreObject) -> Result<StoreObject, MigrationError> {
    rename(&mut object, "name", "full_name")?;
    object.set_data_version(2);
    Ok(object)
}

fn contact_2_to_3(mut object: StoreObject) -> Result<StoreObject, MigrationError> {
    let full_name = contact_fields(&mut object)?
        .get("full_name")
        .and_then(Value::as_str)
        .map(str::to_string);
    contact_fields(&mut object)?.insert("tags".to_string(), json!([]));
    if let Some(full_name) = full_name {
        object.add_index("full_name_bin", full_name);
    }
    object.set_data_version(3);
    Ok(object)
}

fn contact_3_to_2(mut object: StoreObject) -> Result<StoreObject, MigrationError> {
    contact_fields(&mut object)?.remove("tags");
    object.remove_index("full_name_bin", None);
    object.set_data_version(2);
    Ok(object)
}

fn contact_2_to_1(mut object: StoreObject) -> Result<StoreObject, MigrationError> {
    rename(&mut object, "full_name", "name")?;
    object.set_data_version(1);
    Ok(object)
}

impl Model for Contact {
    const VERSION: u32 = 3;
    const MODEL_NAME: &'static str = "tests.Contact";
    const BUCKET: &'static str = "contact";

    fn migrator(from: u32, direction: Direction) -> Option<MigrateFn> {
        match (direction, from) {
            (Direction::Forward, 0) => Some(contact_0_to_1 as MigrateFn),
            (Direction::Forward, 1) => Some(contact_1_to_2 as MigrateFn),
            (Direction::Forward, 2) => Some(contact_2_to_3 as MigrateFn),
            (Direction::Reverse, 3) => Some(contact_3_to_2 as MigrateFn),
            (Direction::Reverse, 2) => Some(contact_2_to_1 as MigrateFn),
            _ => None,
        }
    }
}

/// Version 2 model that only knows how to leave version 0.
pub struct Broken;

impl Model for Broken {
    const VERSION: u32 = 2;
    const MODEL_NAME: &'static str = "tests.Broken";
    const BUCKET: &'static str = "broken";

    fn migrator(from: u32, direction: Direction) -> Option<MigrateFn> {
        match (direction, from) {
            (Direction::Forward, 0) => Some(contact_0_to_1 as MigrateFn),
            _ => None,
        }
    }
}

/// Its only migrator jumps two versions.
pub struct Skipping;

fn skip_ahead(mut object: StoreObject) -> Result<StoreObject, MigrationError> {
    object.set_data_version(2);
    Ok(object)
}

impl Model for Skipping {
    const VERSION: u32 = 2;
    const MODEL_NAME: &'static str = "tests.Skipping";
    const BUCKET: &'static str = "skipping";

    fn migrator(from: u32, direction: Direction) -> Option<MigrateFn> {
        match (direction, from) {
            (Direction::Forward, 0) => Some(skip_ahead as MigrateFn),
            _ => None,
        }
    }
}

pub fn manager_with(client: &MemoryClient, config: ManagerConfig) -> AsyncManager {
    AsyncManager::with_client(Arc::new(client.clone()), config).unwrap()
}

pub fn manager(client: &MemoryClient) -> AsyncManager {
    manager_with(client, ManagerConfig::new(PREFIX))
}

pub fn json_record(data: Value) -> RawResult {
    RawResult::json(&data).unwrap()
}

/// A contact stored at the given version, shaped the way that version stores it.
pub fn contact_at(version: u32, name: &str) -> RawResult {
    match version {
        0 => json_record(json!({"name": name})),
        1 => json_record(json!({"$VERSION": 1, "name": name})),
        2 => json_record(json!({"$VERSION": 2, "full_name": name})),
        _ => json_record(json!({"$VERSION": version, "full_name": name, "tags": []}))
            .with_index("full_name_bin", name),
    }
}
