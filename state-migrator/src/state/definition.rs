use std::fmt::Display;
use std::hash::{Hash, Hasher};

use serde_json::Value;

use super::{GLOBAL_KEY_PREFIX, USER_KEY_PREFIX};

/// A logical namespace of state, e.g. `crypto` or `localData`.
///
/// Only parameterizes physical keys; it is never persisted itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateDefinition {
    name: String,
}

impl StateDefinition {
    /// Creates a namespace named `name`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The namespace name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for StateDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Expected JSON shape of the value held by a [`KeyDefinition`].
///
/// Values are moved opaquely; the shape is only used to log a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// A JSON object
    Object,
    /// A JSON array
    Array,
    /// A JSON string
    String,
    /// A JSON number
    Number,
    /// A JSON boolean
    Bool,
}

impl ValueShape {
    /// Whether `value` has this shape
    #[must_use]
    pub const fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Object, Value::Object(_))
                | (Self::Array, Value::Array(_))
                | (Self::String, Value::String(_))
                | (Self::Number, Value::Number(_))
                | (Self::Bool, Value::Bool(_))
        )
    }
}

/// Which tier of the store a [`KeyDefinition`] is materialized in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope<'a> {
    /// Scoped to one account
    User(&'a str),
    /// Shared by every account
    Global,
}

/// One storage slot inside a [`StateDefinition`].
///
/// Equality and hashing consider only the namespace and the key name; the value shape
/// is a hint.
#[derive(Debug, Clone)]
pub struct KeyDefinition {
    state: StateDefinition,
    key: String,
    shape: Option<ValueShape>,
}

impl KeyDefinition {
    /// Creates the slot `key` inside `state`
    #[must_use]
    pub fn new(state: StateDefinition, key: impl Into<String>) -> Self {
        Self {
            state,
            key: key.into(),
            shape: None,
        }
    }

    /// Attaches the expected value shape
    #[must_use]
    pub fn with_shape(mut self, shape: ValueShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// The namespace this slot lives in
    #[must_use]
    pub const fn state(&self) -> &StateDefinition {
        &self.state
    }

    /// The key name within the namespace
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The expected value shape, if declared
    #[must_use]
    pub const fn shape(&self) -> Option<ValueShape> {
        self.shape
    }

    /// Materializes the physical key for `scope`
    #[must_use]
    pub fn storage_key(&self, scope: KeyScope<'_>) -> String {
        match scope {
            KeyScope::User(user_id) => format!(
                "{USER_KEY_PREFIX}{user_id}_{}_{}",
                self.state.name(),
                self.key
            ),
            KeyScope::Global => {
                format!("{GLOBAL_KEY_PREFIX}{}_{}", self.state.name(), self.key)
            }
        }
    }

    /// `user_<userId>_<stateName>_<key>`
    #[must_use]
    pub fn user_storage_key(&self, user_id: &str) -> String {
        self.storage_key(KeyScope::User(user_id))
    }

    /// `global_<stateName>_<key>`
    #[must_use]
    pub fn global_storage_key(&self) -> String {
        self.storage_key(KeyScope::Global)
    }
}

impl PartialEq for KeyDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.key == other.key
    }
}

impl Eq for KeyDefinition {}

impl Hash for KeyDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state.hash(state);
        self.key.hash(state);
    }
}

impl Display for KeyDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.state, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn local_data() -> KeyDefinition {
        KeyDefinition::new(StateDefinition::new("localData"), "ciphers")
    }

    #[test]
    fn test_physical_key_layouts() {
        let key = local_data();
        assert_eq!(key.user_storage_key("u1"), "user_u1_localData_ciphers");
        assert_eq!(key.global_storage_key(), "global_localData_ciphers");
        assert_eq!(
            key.storage_key(KeyScope::User("u2")),
            "user_u2_localData_ciphers"
        );
    }

    #[test]
    fn test_equality_ignores_shape_hint() {
        let plain = local_data();
        let hinted = local_data().with_shape(ValueShape::Object);
        assert_eq!(plain, hinted);

        let mut set = HashSet::new();
        set.insert(plain);
        assert!(set.contains(&hinted));
    }

    #[test]
    fn test_equality_requires_both_fields() {
        let a = KeyDefinition::new(StateDefinition::new("crypto"), "pin");
        let b = KeyDefinition::new(StateDefinition::new("settings"), "pin");
        let c = KeyDefinition::new(StateDefinition::new("crypto"), "masterKey");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_value_shape_matches() {
        assert!(ValueShape::Object.matches(&json!({"c1": {}})));
        assert!(ValueShape::String.matches(&json!("2.abc|def")));
        assert!(!ValueShape::String.matches(&json!(1)));
        assert!(!ValueShape::Array.matches(&json!(null)));
    }
}
