use std::fmt;
use std::sync::Arc;
use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

pub type Dict<K = Arc<str>, V = Value> = BTreeMap<K, V>;

/// A metadata value, as read from front matter.
///
/// Substitution into templates uses the [`Display`](fmt::Display)
/// implementation: strings verbatim, scalars in their canonical form, `Null`
/// as nothing, arrays and dictionaries as compact JSON.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    Array(Arc<Vec<Value>>),
    Dict(Arc<Dict>),
}

impl Value {
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None
        }
    }

    pub fn to_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&**s),
            _ => None
        }
    }

    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v.as_slice()),
            _ => None
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(v) => Some(&**v),
            _ => None
        }
    }

    /// Follows a dotted `path` through nested dictionaries.
    ///
    /// ```rust
    /// use sitebuilder::dict;
    /// use sitebuilder::value::Value;
    ///
    /// let author = dict!["name" => "Ada", "age" => 36];
    /// let meta = Value::from(dict!["author" => author]);
    ///
    /// assert_eq!(meta.lookup("author.name"), Some(&Value::from("Ada")));
    /// assert_eq!(meta.lookup("author.age").and_then(Value::to_int), Some(36));
    /// assert_eq!(meta.lookup("author.email"), None);
    /// assert_eq!(meta.lookup("author.name.first"), None);
    /// ```
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(self, |value, key| value.as_dict()?.get(key))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
        }
    }
}

/// Looks up a dotted `path` in a dictionary of metadata.
pub fn lookup<'a>(dict: &'a Dict, path: &str) -> Option<&'a Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    let value = dict.get(head)?;
    match rest {
        Some(rest) => value.lookup(rest),
        None => Some(value),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => b.fmt(f),
            Value::Int(n) => n.fmt(f),
            Value::Float(n) => n.fmt(f),
            Value::String(s) => f.write_str(s),
            Value::Array(_) | Value::Dict(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

macro_rules! impl_from_primitive {
    ($($T:ty),+ => $E:ident::$kind:ident) => {
        $(
            impl From<$T> for $E {
                fn from(value: $T) -> Self {
                    $E::$kind(value.into())
                }
            }
        )+
    };
}

impl_from_primitive!(bool => Value::Bool);
impl_from_primitive!(&str => Value::String);
impl_from_primitive!(std::borrow::Cow<'_, str> => Value::String);
impl_from_primitive!(String => Value::String);
impl_from_primitive!(Arc<str> => Value::String);
impl_from_primitive!(Arc<Vec<Value>> => Value::Array);
impl_from_primitive!(Arc<Dict> => Value::Dict);
impl_from_primitive!(i8, i16, i32, i64, u8, u16, u32 => Value::Int);
impl_from_primitive!(f32, f64 => Value::Float);

impl From<()> for Value  {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T> From<Option<T>> for Value where Value: From<T> {
    fn from(value: Option<T>) -> Self {
        value.map(Value::from).unwrap_or(Value::Null)
    }
}

impl<T> From<Vec<T>> for Value where Value: From<T> {
    fn from(value: Vec<T>) -> Self {
        value.into_iter()
            .map(Value::from)
            .collect()
    }
}

impl<K, V> From<Dict<K, V>> for Value where Arc<str>: From<K>, Value: From<V> {
    fn from(value: Dict<K, V>) -> Self {
        let dict = value.into_iter()
            .map(|(k, v)| (<Arc::<str>>::from(k), Value::from(v)))
            .collect::<Dict>();

        Value::Dict(Arc::new(dict))
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        let vec = iter.into_iter().collect::<Vec<Value>>();
        Value::Array(Arc::from(vec))
    }
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => s.into(),
            toml::Value::Integer(n) => n.into(),
            toml::Value::Float(n) => n.into(),
            toml::Value::Boolean(b) => b.into(),
            toml::Value::Datetime(dt) => dt.to_string().into(),
            toml::Value::Array(array) => array.into_iter().map(Value::from).collect(),
            toml::Value::Table(table) => Value::Dict(Arc::new(table.into_iter()
                .map(|(k, v)| (Arc::from(k), Value::from(v)))
                .collect())),
        }
    }
}

impl TryFrom<serde_yaml::Value> for Value {
    type Error = String;

    fn try_from(value: serde_yaml::Value) -> Result<Self, Self::Error> {
        use serde_yaml::Value as Yaml;

        Ok(match value {
            Yaml::Null => Value::Null,
            Yaml::Bool(b) => b.into(),
            Yaml::Number(n) => match n.as_i64() {
                Some(n) => n.into(),
                None => n.as_f64().ok_or_else(|| format!("unrepresentable number {n}"))?.into(),
            },
            Yaml::String(s) => s.into(),
            Yaml::Sequence(seq) => seq.into_iter()
                .map(Value::try_from)
                .collect::<Result<Value, _>>()?,
            Yaml::Mapping(map) => {
                let mut dict = Dict::new();
                for (k, v) in map {
                    let key = match k {
                        Yaml::String(s) => s,
                        Yaml::Bool(b) => b.to_string(),
                        Yaml::Number(n) => n.to_string(),
                        other => return Err(format!("unsupported mapping key {other:?}")),
                    };

                    dict.insert(key.into(), Value::try_from(v)?);
                }

                Value::Dict(Arc::new(dict))
            }
            Yaml::Tagged(tagged) => Value::try_from(tagged.value)?,
        })
    }
}
