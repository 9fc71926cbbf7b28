//! Configuration sources.
//!
//! A source produces a flat-or-nested [`Table`]; the engine does not care how
//! it got there. Sources that need to know which keys are expected (such as
//! [`crate::env::EnvVars`]) receive the sorted registered keys and the active
//! [`KeySplitter`].

use std::fmt;

use crate::{error::Result, key::KeySplitter, value::Table};

pub trait Source: Send + Sync {
    /// Produce this source's key/value pairs. Keys may be dotted paths,
    /// values may be nested tables; both are merged the same way.
    fn unmarshal(&self, expected_keys: &[String], splitter: &KeySplitter) -> Result<Table>;

    /// Human-readable name used in logs.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_owned()
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn unmarshal(&self, expected_keys: &[String], splitter: &KeySplitter) -> Result<Table> {
        (**self).unmarshal(expected_keys, splitter)
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

/// A fixed, in-memory table.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    values: Table,
}

impl MemorySource {
    #[must_use]
    pub fn new(values: Table) -> Self {
        Self {
            name: "memory".into(),
            values,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn values(&self) -> &Table {
        &self.values
    }
}

impl Source for MemorySource {
    fn unmarshal(&self, _expected_keys: &[String], _splitter: &KeySplitter) -> Result<Table> {
        Ok(self.values.clone())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Adapts a closure into a [`Source`].
pub struct SourceFn<F> {
    name: String,
    f: F,
}

impl<F> SourceFn<F>
where
    F: Fn(&[String], &KeySplitter) -> Result<Table> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Source for SourceFn<F>
where
    F: Fn(&[String], &KeySplitter) -> Result<Table> + Send + Sync,
{
    fn unmarshal(&self, expected_keys: &[String], splitter: &KeySplitter) -> Result<Table> {
        (self.f)(expected_keys, splitter)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

impl<F> fmt::Debug for SourceFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFn").field("name", &self.name).finish()
    }
}
