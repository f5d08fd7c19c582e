//! Core types shared by sessions, connectors and the zone router

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Which database zone a request should be served by
///
/// Each zone carries the configuration namespace its connection parameters
/// are loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    /// The zone co-located with this process
    Local,
    /// The remote zone holding the authoritative copy
    Primary,
}

impl Zone {
    /// All zones in routing order
    pub const ALL: [Zone; 2] = [Zone::Local, Zone::Primary];

    /// Configuration namespace prefix for this zone
    pub fn config_prefix(&self) -> &'static str {
        match self {
            Zone::Local => "metastore.local",
            Zone::Primary => "metastore.primary",
        }
    }

    /// Prefix used for environment variable overrides, e.g. `METASTORE_LOCAL`
    pub fn env_prefix(&self) -> String {
        self.config_prefix().replace('.', "_").to_uppercase()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Local => "local",
            Zone::Primary => "primary",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row locking behaviour for reads issued through a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockMode {
    /// Shared read lock held until the transaction ends
    Shared,
    /// Exclusive lock held until the transaction ends
    Exclusive,
    /// No lock; reads see the last committed value
    #[default]
    ReadCommitted,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "shared"),
            LockMode::Exclusive => write!(f, "exclusive"),
            LockMode::ReadCommitted => write!(f, "read-committed"),
        }
    }
}

/// One component of a composite primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(value as i64)
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<Vec<u8>> for KeyPart {
    fn from(value: Vec<u8>) -> Self {
        KeyPart::Bytes(value)
    }
}

/// Composite primary key, compared part by part
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(pub Vec<KeyPart>);

impl Key {
    pub fn new(parts: impl IntoIterator<Item = KeyPart>) -> Self {
        Self(parts.into_iter().collect())
    }

    pub fn single(part: impl Into<KeyPart>) -> Self {
        Self(vec![part.into()])
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

macro_rules! key_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Key {
                fn from(value: $ty) -> Self {
                    Key::single(value)
                }
            }
        )*
    };
}

key_from!(i64, i32, &str, String, Vec<u8>, KeyPart);

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match part {
                KeyPart::Int(v) => write!(f, "{}", v)?,
                KeyPart::Str(v) => write!(f, "{:?}", v)?,
                KeyPart::Bytes(v) => write!(f, "<{} bytes>", v.len())?,
            }
        }
        write!(f, ")")
    }
}

/// A persisted row: table, primary key and column values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub table: String,
    pub key: Key,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(table: impl Into<String>, key: impl Into<Key>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style column setter
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

/// Filter over record columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Eq(String, Value),
    In(String, Vec<Value>),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq(column.into(), value.into())
    }

    pub fn is_in(column: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        Predicate::In(column.into(), values.into_iter().collect())
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut terms) => {
                terms.push(other);
                Predicate::And(terms)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut terms) => {
                terms.push(other);
                Predicate::Or(terms)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    /// Evaluate the predicate against a record's columns
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::Eq(column, value) => record.get(column) == Some(value),
            Predicate::In(column, values) => record
                .get(column)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Predicate::Not(inner) => !inner.matches(record),
            Predicate::And(terms) => terms.iter().all(|p| p.matches(record)),
            Predicate::Or(terms) => terms.iter().any(|p| p.matches(record)),
        }
    }
}

/// A query over one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub table: String,
    pub filter: Option<Predicate>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            limit: None,
        }
    }

    /// Add a filter; repeated calls are combined with `And`
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.table == self.table
            && self.filter.as_ref().map(|p| p.matches(record)).unwrap_or(true)
    }
}
