use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A path segment that should be an object holds something else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot descend into `{segment}` of `{path}`: not an object")]
pub struct PathConflict {
    /// Full dotted path being written
    pub path: String,
    /// The segment holding a non-object value
    pub segment: String,
}

/// The legacy per-user blob: a JSON object with arbitrary, optional fields.
///
/// Fields are addressed by dotted paths (`settings.pinKeyEncryptedUserKey`). A blob that is
/// not a JSON object fails to deserialize, which the helper reports as a malformed record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountRecord(Map<String, Value>);

impl AccountRecord {
    /// An empty record, used as the shell when a value is restored into a missing account
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live value at `path`. `null` counts as absent.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let (parents, leaf) = split_path(path);
        let mut current = &self.0;
        for segment in parents {
            current = current.get(segment)?.as_object()?;
        }
        current.get(leaf).filter(|value| !value.is_null())
    }

    /// Removes and returns the live value at `path`.
    ///
    /// A `null` or missing field is left in place and `None` is returned. Parents emptied by
    /// the removal are kept so that re-inserting restores the original record.
    pub fn take_path(&mut self, path: &str) -> Option<Value> {
        let (parents, leaf) = split_path(path);
        let mut current = &mut self.0;
        for segment in parents {
            current = current.get_mut(segment)?.as_object_mut()?;
        }
        let is_live = current.get(leaf).is_some_and(|value| !value.is_null());
        if is_live {
            current.remove(leaf)
        } else {
            None
        }
    }

    /// Writes `value` at `path`, creating missing parent objects and overwriting any
    /// existing value. Returns the previous value.
    ///
    /// # Errors
    /// - [`PathConflict`] if a parent segment exists but is not an object
    pub fn insert_path(&mut self, path: &str, value: Value) -> Result<Option<Value>, PathConflict> {
        let (parents, leaf) = split_path(path);
        let mut current = &mut self.0;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if entry.is_null() {
                *entry = Value::Object(Map::new());
            }
            current = entry.as_object_mut().ok_or_else(|| PathConflict {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
        }
        Ok(current.insert(leaf.to_string(), value))
    }
}

impl From<Map<String, Value>> for AccountRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl From<AccountRecord> for Value {
    fn from(record: AccountRecord) -> Self {
        Self::Object(record.0)
    }
}

/// Splits `a.b.c` into (`[a, b]`, `c`)
fn split_path(path: &str) -> (Vec<&str>, &str) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let leaf = segments.pop().unwrap_or_default();
    (segments, leaf)
}
