//! Schema migrations between stored record versions.
//!
//! Records carry their schema version in the reserved `$VERSION` field. On
//! the way in, a record is moved forward one version at a time until it
//! reaches the model's current version; on the way out it is moved back to
//! the version the store expects. Every move is one [`MigrationStep`],
//! decided by [`MigrationChain::step`] from the record's version alone, so
//! a chain either reaches its target in exactly `|target - stored|` steps
//! or stops with an error.

use std::fmt;
use std::marker::PhantomData;

use riakpersist_client::StoreObject;
use serde_json::Value;
use thiserror::Error;

use crate::model::Model;

/// Direction of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards newer versions, applied when reading.
    Forward,
    /// Towards older versions, applied when writing.
    Reverse,
}

impl Direction {
    /// The version adjacent to `version` in this direction.
    pub fn next_version(self, version: u32) -> Option<u32> {
        match self {
            Direction::Forward => version.checked_add(1),
            Direction::Reverse => version.checked_sub(1),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Reverse => write!(f, "reverse"),
        }
    }
}

/// Moves a record exactly one version in its direction.
pub type MigrateFn = fn(StoreObject) -> Result<StoreObject, MigrationError>;

/// A broken migration chain. These are configuration faults of the model,
/// not data errors, and are never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("no {direction} migrator for {model} version {version}")]
    MissingMigrator {
        model: &'static str,
        version: u32,
        direction: Direction,
    },

    #[error(
        "{model} migrator from version {from} produced version {produced:?}, expected {expected}"
    )]
    UnexpectedVersion {
        model: &'static str,
        from: u32,
        expected: u32,
        produced: Option<u32>,
    },

    #[error("{model} record has no structured data to migrate")]
    MissingData { model: &'static str },

    #[error("{model} record has unreadable version {found}")]
    InvalidVersion { model: &'static str, found: Value },

    #[error("invalid record: {message}")]
    Invalid { message: String },
}

impl MigrationError {
    /// For migrators rejecting a record they cannot transform.
    pub fn invalid(message: impl Into<String>) -> Self {
        MigrationError::Invalid {
            message: message.into(),
        }
    }
}

/// One state of the migration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    /// The record is at the target version.
    AtTarget,
    /// Apply the forward migrator for this version.
    Forward(u32),
    /// Apply the reverse migrator for this version.
    Reverse(u32),
    /// No migrator leads from this version towards the target.
    Unknown(u32),
}

/// The outcome of a completed migration.
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    pub object: StoreObject,
    pub steps: u32,
}

impl Migrated {
    pub fn was_migrated(&self) -> bool {
        self.steps > 0
    }
}

/// The migrators of one model, driven as a state machine.
pub struct MigrationChain<M> {
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> MigrationChain<M> {
    /// Decide the next step for a record at `version`.
    pub fn step(version: u32, target: u32, direction: Direction) -> MigrationStep {
        let towards_target = match direction {
            Direction::Forward => version < target,
            Direction::Reverse => version > target,
        };
        if version == target {
            MigrationStep::AtTarget
        } else if !towards_target || M::migrator(version, direction).is_none() {
            MigrationStep::Unknown(version)
        } else {
            match direction {
                Direction::Forward => MigrationStep::Forward(version),
                Direction::Reverse => MigrationStep::Reverse(version),
            }
        }
    }

    /// Apply one migrator and check that it landed on the adjacent version.
    pub fn apply(
        object: StoreObject,
        from: u32,
        direction: Direction,
    ) -> Result<StoreObject, MigrationError> {
        let missing = MigrationError::MissingMigrator {
            model: M::MODEL_NAME,
            version: from,
            direction,
        };
        let migrator = M::migrator(from, direction).ok_or(missing.clone())?;
        let expected = direction.next_version(from).ok_or(missing)?;

        let migrated = migrator(object)?;
        let produced = migrated.data_version();
        if produced != Some(expected) {
            return Err(MigrationError::UnexpectedVersion {
                model: M::MODEL_NAME,
                from,
                expected,
                produced,
            });
        }
        Ok(migrated)
    }

    /// Migrate `object` until it reaches `target`.
    pub fn run(
        mut object: StoreObject,
        target: u32,
        direction: Direction,
    ) -> Result<Migrated, MigrationError> {
        let mut steps = 0;
        loop {
            let version = Self::version_of(&object)?;
            match Self::step(version, target, direction) {
                MigrationStep::AtTarget => return Ok(Migrated { object, steps }),
                MigrationStep::Forward(from) | MigrationStep::Reverse(from) => {
                    tracing::debug!(model = M::MODEL_NAME, from, %direction, "migrating record");
                    object = Self::apply(object, from, direction)?;
                    steps += 1;
                }
                MigrationStep::Unknown(version) => {
                    return Err(MigrationError::MissingMigrator {
                        model: M::MODEL_NAME,
                        version,
                        direction,
                    })
                }
            }
        }
    }

    /// The stored version of `object`, which must be a readable one.
    fn version_of(object: &StoreObject) -> Result<u32, MigrationError> {
        if object.fields().is_none() {
            return Err(MigrationError::MissingData {
                model: M::MODEL_NAME,
            });
        }
        object
            .data_version()
            .ok_or_else(|| MigrationError::InvalidVersion {
                model: M::MODEL_NAME,
                found: object.version_value().cloned().unwrap_or(Value::Null),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Counter;

    fn bump(mut object: StoreObject) -> Result<StoreObject, MigrationError> {
        let version = object.data_version().unwrap_or(0);
        object.set_data_version(version + 1);
        Ok(object)
    }

    fn drop_one(mut object: StoreObject) -> Result<StoreObject, MigrationError> {
        let version = object.data_version().unwrap_or(0);
        object.set_data_version(version - 1);
        Ok(object)
    }

    fn stuck(object: StoreObject) -> Result<StoreObject, MigrationError> {
        Ok(object)
    }

    impl Model for Counter {
        const VERSION: u32 = 3;
        const MODEL_NAME: &'static str = "tests.Counter";
        const BUCKET: &'static str = "counter";

        fn migrator(from: u32, direction: Direction) -> Option<MigrateFn> {
            match (direction, from) {
                (Direction::Forward, 0..=2) => Some(bump as MigrateFn),
                (Direction::Reverse, 2..=3) => Some(drop_one as MigrateFn),
                (Direction::Forward, 7) => Some(stuck as MigrateFn),
                _ => None,
            }
        }
    }

    fn at_version(version: u32) -> StoreObject {
        StoreObject::versioned("b", "k", version)
    }

    #[test]
    fn step_transitions() {
        type Chain = MigrationChain<Counter>;
        assert_eq!(Chain::step(3, 3, Direction::Forward), MigrationStep::AtTarget);
        assert_eq!(Chain::step(1, 3, Direction::Forward), MigrationStep::Forward(1));
        assert_eq!(Chain::step(3, 1, Direction::Reverse), MigrationStep::Reverse(3));
        assert_eq!(Chain::step(1, 0, Direction::Reverse), MigrationStep::Unknown(1));
        assert_eq!(Chain::step(5, 3, Direction::Forward), MigrationStep::Unknown(5));
        assert_eq!(Chain::step(1, 3, Direction::Reverse), MigrationStep::Unknown(1));
    }

    #[test]
    fn forward_run_counts_steps() {
        for stored in 0..=3 {
            let migrated =
                MigrationChain::<Counter>::run(at_version(stored), 3, Direction::Forward).unwrap();
            assert_eq!(migrated.steps, 3 - stored);
            assert_eq!(migrated.was_migrated(), stored != 3);
            assert_eq!(migrated.object.data_version(), Some(3));
        }
    }

    #[test]
    fn missing_version_field_is_version_zero() {
        let mut object = StoreObject::new("b", "k");
        object.set_data(json!({"name": "x"}));
        let migrated = MigrationChain::<Counter>::run(object, 3, Direction::Forward).unwrap();
        assert_eq!(migrated.steps, 3);
    }

    #[test]
    fn reverse_run() {
        let migrated =
            MigrationChain::<Counter>::run(at_version(3), 1, Direction::Reverse).unwrap();
        assert_eq!(migrated.steps, 2);
        assert_eq!(migrated.object.data_version(), Some(1));
    }

    #[test]
    fn unreachable_target_is_missing_migrator() {
        let err = MigrationChain::<Counter>::run(at_version(3), 0, Direction::Reverse).unwrap_err();
        assert_eq!(
            err,
            MigrationError::MissingMigrator {
                model: "tests.Counter",
                version: 1,
                direction: Direction::Reverse,
            }
        );
    }

    #[test]
    fn migrator_must_land_on_adjacent_version() {
        let err =
            MigrationChain::<Counter>::apply(at_version(7), 7, Direction::Forward).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::UnexpectedVersion {
                from: 7,
                expected: 8,
                produced: Some(7),
                ..
            }
        ));
    }

    #[test]
    fn undecoded_record_is_missing_data() {
        let object = StoreObject::new("b", "k");
        let err = MigrationChain::<Counter>::run(object, 3, Direction::Forward).unwrap_err();
        assert!(matches!(err, MigrationError::MissingData { .. }));
    }

    #[test]
    fn unreadable_version_is_fatal() {
        let mut object = StoreObject::new("b", "k");
        object.set_data(json!({"$VERSION": "3"}));
        let err = MigrationChain::<Counter>::run(object, 3, Direction::Forward).unwrap_err();
        assert_eq!(
            err,
            MigrationError::InvalidVersion {
                model: "tests.Counter",
                found: json!("3"),
            }
        );
    }
}
