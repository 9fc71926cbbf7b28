//! The untyped configuration value tree.

use std::{collections::BTreeMap, fmt};

use serde::Serialize;

use crate::error::{Error, Result};

/// A nested mapping from key segment to value. Ordered so that encoders and
/// merge order are deterministic.
pub type Table = BTreeMap<String, Value>;

/// A configuration value. Only [`Value::Table`] participates in deep merging;
/// every other variant (arrays included) is a leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Array(Vec<Value>),
    Table(Table),
}

impl Value {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Array(_) => "array",
            Self::Table(_) => "table",
        }
    }

    #[must_use]
    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table(_))
    }

    #[must_use]
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Follow `path` through nested tables. An empty path returns `self`;
    /// running into a leaf before the path is exhausted is a miss.
    #[must_use]
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self.as_table()?.get(head.as_ref())?.lookup(rest),
        }
    }

    /// Lowercase every table key, recursively.
    #[must_use]
    pub fn lowercase_keys(self) -> Self {
        match self {
            Self::Table(table) => Self::Table(
                table
                    .into_iter()
                    .map(|(key, value)| (key.to_lowercase(), value.lowercase_keys()))
                    .collect(),
            ),
            Self::Array(items) => {
                Self::Array(items.into_iter().map(Self::lowercase_keys).collect())
            },
            leaf => leaf,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Array(_) | Self::Table(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            },
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Table> for Value {
    fn from(value: Table) -> Self {
        Self::Table(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

// ── Conversions from decoded documents ─────────────────────────────────────

impl TryFrom<serde_json::Value> for Value {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value as Json;

        Ok(match value {
            Json::Null => return Err(Error::UnsupportedValue { kind: "null" }),
            Json::Bool(b) => Self::Boolean(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().ok_or(Error::UnsupportedValue {
                    kind: "out-of-range number",
                })?),
            },
            Json::String(s) => Self::String(s),
            Json::Array(items) => Self::Array(
                items
                    .into_iter()
                    .map(Self::try_from)
                    .collect::<Result<_>>()?,
            ),
            Json::Object(entries) => Self::Table(
                entries
                    .into_iter()
                    .map(|(key, value)| Ok((key, Self::try_from(value)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        use toml::Value as Toml;

        match value {
            Toml::String(s) => Self::String(s),
            Toml::Integer(i) => Self::Integer(i),
            Toml::Float(x) => Self::Float(x),
            Toml::Boolean(b) => Self::Boolean(b),
            // Datetimes have no dedicated variant; keep their RFC 3339 text.
            Toml::Datetime(dt) => Self::String(dt.to_string()),
            Toml::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Toml::Table(entries) => Self::Table(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl TryFrom<serde_yaml::Value> for Value {
    type Error = Error;

    fn try_from(value: serde_yaml::Value) -> Result<Self> {
        use serde_yaml::Value as Yaml;

        Ok(match value {
            Yaml::Null => return Err(Error::UnsupportedValue { kind: "null" }),
            Yaml::Bool(b) => Self::Boolean(b),
            Yaml::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().ok_or(Error::UnsupportedValue {
                    kind: "out-of-range number",
                })?),
            },
            Yaml::String(s) => Self::String(s),
            Yaml::Sequence(items) => Self::Array(
                items
                    .into_iter()
                    .map(Self::try_from)
                    .collect::<Result<_>>()?,
            ),
            Yaml::Mapping(entries) => Self::Table(
                entries
                    .into_iter()
                    .map(|(key, value)| Ok((yaml_key(key)?, Self::try_from(value)?)))
                    .collect::<Result<_>>()?,
            ),
            Yaml::Tagged(tagged) => Self::try_from(tagged.value)?,
        })
    }
}

/// YAML allows non-string mapping keys; scalars are stringified.
fn yaml_key(key: serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        other => Err(Error::UnsupportedValue {
            kind: match other {
                Yaml::Null => "null mapping key",
                _ => "composite mapping key",
            },
        }),
    }
}
