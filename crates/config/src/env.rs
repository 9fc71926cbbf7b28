//! Environment variable source.
//!
//! For every registered key the source derives a variable name by
//! uppercasing each path segment and joining them with `_`, optionally behind
//! a prefix: key `db.host` with prefix `app` reads `APP_DB_HOST`.

use std::fmt;

use tracing::trace;

use crate::{
    error::Result,
    key::KeySplitter,
    source::Source,
    value::{Table, Value},
};

/// Separator placed between the prefix and each key segment.
pub const ENV_VAR_SEPARATOR: &str = "_";

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct EnvVars {
    prefix: String,
    lookup: Lookup,
}

impl EnvVars {
    /// Read from the process environment.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_lookup(prefix, |name| {
            std::env::var_os(name).map(|v| v.to_string_lossy().into_owned())
        })
    }

    /// Read through a custom lookup function instead of the process
    /// environment.
    pub fn with_lookup(
        prefix: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            lookup: Box::new(lookup),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Variable name consulted for `key`.
    #[must_use]
    pub fn var_name(&self, key: &str, splitter: &KeySplitter) -> String {
        let mut parts = Vec::new();
        if !self.prefix.is_empty() {
            parts.push(self.prefix.to_uppercase());
        }
        parts.extend(splitter.split(key).into_iter().map(str::to_uppercase));
        parts.join(ENV_VAR_SEPARATOR)
    }
}

impl Source for EnvVars {
    /// Only variables that are present, even if empty, produce entries. Values
    /// are always strings; the typed accessors coerce them.
    fn unmarshal(&self, expected_keys: &[String], splitter: &KeySplitter) -> Result<Table> {
        let mut values = Table::new();
        for key in expected_keys {
            let name = self.var_name(key, splitter);
            if let Some(value) = (self.lookup)(&name) {
                trace!(key = %key, var = %name, "found environment variable");
                values.insert(key.clone(), Value::String(value));
            }
        }
        Ok(values)
    }

    fn name(&self) -> String {
        if self.prefix.is_empty() {
            "env".to_owned()
        } else {
            format!("env:{}", self.prefix.to_uppercase())
        }
    }
}

impl fmt::Debug for EnvVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvVars")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
