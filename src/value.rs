//! Typed value blobs and the sorted value store each key owns.

use serde::{Deserialize, Serialize};

use crate::path::{name_cmp, MAX_VALUE_NAME_LEN};
use crate::StatusCode;

/// Closed set of value type tags (spec §3 Value).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    None,
    Sz,
    ExpandSz,
    Binary,
    Dword,
    MultiSz,
    Link,
}

impl ValueType {
    /// Type tag used in the text format's `str(N)`/`hex(N)` typed forms.
    pub fn code(self) -> u32 {
        match self {
            ValueType::None => 0,
            ValueType::Sz => 1,
            ValueType::ExpandSz => 2,
            ValueType::Binary => 3,
            ValueType::Dword => 4,
            ValueType::MultiSz => 7,
            ValueType::Link => 6,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(ValueType::None),
            1 => Some(ValueType::Sz),
            2 => Some(ValueType::ExpandSz),
            3 => Some(ValueType::Binary),
            4 => Some(ValueType::Dword),
            7 => Some(ValueType::MultiSz),
            6 => Some(ValueType::Link),
            _ => None,
        }
    }
}

/// Name of the value that carries a symlink key's redirect target (spec §3, §4.1).
pub const SYMLINK_VALUE_NAME: &str = "SymbolicLinkValue";

/// A single named, typed blob living inside a key. An empty `name` denotes
/// the key's unnamed "default" value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub name: String,
    pub value_type: ValueType,
    pub data: Vec<u8>,
}

impl Value {
    pub fn new(name: String, value_type: ValueType, data: Vec<u8>) -> Self {
        Self { name, value_type, data }
    }

    fn matches(&self, value_type: ValueType, data: &[u8]) -> bool {
        self.value_type == value_type && self.data == data
    }
}

/// Sorted, unique-by-case-insensitive-name array of a key's values.
///
/// Kept in sorted order at all times so lookups are a binary search and the
/// empty-named default value always sorts first (spec §3 invariants).
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    values: Vec<Value>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    fn search(&self, name: &str) -> std::result::Result<usize, usize> {
        self.values.binary_search_by(|v| name_cmp(&v.name, name))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.search(name).ok().map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    pub fn at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sets a value, returning `true` if the key should be marked dirty
    /// (i.e. this was not a no-op matching an existing value of the same
    /// type, length and bytes — spec §4.5 Set).
    pub fn set(
        &mut self,
        name: &str,
        value_type: ValueType,
        data: Vec<u8>,
    ) -> Result<bool, StatusCode> {
        if name.chars().count() > MAX_VALUE_NAME_LEN {
            return Err(StatusCode::NameTooLong);
        }
        match self.search(name) {
            Ok(i) => {
                if self.values[i].matches(value_type, &data) {
                    Ok(false)
                } else {
                    self.values[i] = Value::new(name.to_owned(), value_type, data);
                    Ok(true)
                }
            }
            Err(i) => {
                self.values.insert(i, Value::new(name.to_owned(), value_type, data));
                Ok(true)
            }
        }
    }

    /// Removes a value by name, returning an error if it does not exist
    /// (spec §4.5 Delete-value).
    pub fn remove(&mut self, name: &str) -> Result<(), StatusCode> {
        match self.search(name) {
            Ok(i) => {
                self.values.remove(i);
                Ok(())
            }
            Err(_) => Err(StatusCode::ObjectNameNotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_value_sorts_first() {
        let mut store = ValueStore::new();
        store.set("Name", ValueType::Sz, b"x".to_vec()).unwrap();
        store.set("", ValueType::Sz, b"default".to_vec()).unwrap();
        assert_eq!(store.at(0).unwrap().name, "");
        assert_eq!(store.at(1).unwrap().name, "Name");
    }

    #[test]
    fn identical_set_is_noop() {
        let mut store = ValueStore::new();
        assert!(store.set("Count", ValueType::Dword, vec![1, 0, 0, 0]).unwrap());
        assert!(!store.set("Count", ValueType::Dword, vec![1, 0, 0, 0]).unwrap());
    }

    #[test]
    fn rejects_overlong_name() {
        let mut store = ValueStore::new();
        let long = "a".repeat(16384);
        assert_eq!(
            store.set(&long, ValueType::Sz, vec![]).unwrap_err(),
            StatusCode::NameTooLong
        );
        let ok = "a".repeat(16383);
        assert!(store.set(&ok, ValueType::Sz, vec![]).unwrap());
    }

    #[test]
    fn missing_delete_errors() {
        let mut store = ValueStore::new();
        assert_eq!(store.remove("nope").unwrap_err(), StatusCode::ObjectNameNotFound);
    }
}
