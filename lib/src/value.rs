use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::de::{self, Deserialize, Deserializer, MapAccess, Visitor};

/// A value a variable can be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// A single literal, emitted by `use`.
    Scalar(Arc<str>),
    /// An ordered sequence of literals, iterated by `for`.
    List(Arc<[Arc<str>]>),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Scalar(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Scalar(value.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(value: Arc<str>) -> Self {
        Value::Scalar(value)
    }
}

impl<T: Into<Arc<str>>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(|v| v.into()).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => f.write_str(s),
            Value::List(list) => {
                f.write_str("[")?;
                for (i, item) in list.iter().enumerate() {
                    if i != 0 { f.write_str(", ")?; }
                    write!(f, "{item:?}")?;
                }

                f.write_str("]")
            }
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Scalar {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl From<Scalar> for Arc<str> {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::String(s) => s.into(),
            Scalar::Integer(i) => i.to_string().into(),
            Scalar::Float(f) => f.to_string().into(),
            Scalar::Bool(b) => b.to_string().into(),
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

/// Strings, numbers, and booleans deserialize as scalars; arrays of those
/// as lists. Anything nested is rejected.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawValue::deserialize(deserializer).map_err(|_| {
            <D::Error as de::Error>::custom("expected a string, number, boolean, or array of those")
        })?;

        Ok(match raw {
            RawValue::Scalar(s) => Value::Scalar(s.into()),
            RawValue::List(list) => Value::List(list.into_iter().map(Arc::from).collect()),
        })
    }
}

/// The outermost scope of every page: a flat, ordered map from variable
/// names to values.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Globals {
    entries: Vec<(Arc<str>, Value)>,
    index: FxHashMap<Arc<str>, usize>,
}

impl Globals {
    pub fn new() -> Self {
        Globals::default()
    }

    /// Parses a TOML document whose top-level keys are all globals.
    pub fn from_toml(string: &str) -> crate::error::Result<Self> {
        Ok(toml::from_str(string)?)
    }

    /// Binds `name` to `value`. Rebinding keeps the name's original position
    /// and returns the previous value.
    pub fn insert<K, V>(&mut self, name: K, value: V) -> Option<Value>
        where K: Into<Arc<str>>, V: Into<Value>
    {
        let (name, value) = (name.into(), value.into());
        match self.index.get(&name) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Globals in the order they were first bound.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> FromIterator<(K, V)> for Globals {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut globals = Globals::new();
        for (k, v) in iter {
            globals.insert(k, v);
        }

        globals
    }
}

impl<'de> Deserialize<'de> for Globals {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GlobalsVisitor;

        impl<'de> Visitor<'de> for GlobalsVisitor {
            type Value = Globals;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a flat map of global variables")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Globals, A::Error> {
                let mut globals = Globals::new();
                while let Some((name, value)) = map.next_entry::<String, Value>()? {
                    globals.insert(name, value);
                }

                Ok(globals)
            }
        }

        deserializer.deserialize_map(GlobalsVisitor)
    }
}
