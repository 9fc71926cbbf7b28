//! Per-key validators run while values are merged.
//!
//! Validators are registered against full key paths. When a source hands over
//! a whole table for a parent key, every validator registered underneath that
//! key is run against the matching sub-value, so `db.port` is still checked
//! when a file supplies `db = { port = ... }`.

use std::{collections::BTreeMap, fmt};

use tracing::trace;

use crate::{
    error::{BoxError, ValidationError},
    key::KeySplitter,
    value::Value,
};

/// A validation function coupled with a configuration key.
pub type Validator = Box<dyn Fn(&Value) -> Result<(), BoxError> + Send + Sync>;

/// Box a closure as a [`Validator`]. Any error convertible into a boxed error
/// (including `String` and `&str`) may be returned.
pub fn validator<F, E>(f: F) -> Validator
where
    F: Fn(&Value) -> Result<(), E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    Box::new(move |value| f(value).map_err(Into::into))
}

/// Validators keyed by full key path.
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: BTreeMap<String, Vec<Validator>>,
}

impl ValidatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the validators for `key`. An empty list leaves any existing
    /// registration untouched.
    pub fn register(&mut self, key: impl Into<String>, validators: Vec<Validator>) {
        if validators.is_empty() {
            return;
        }
        self.validators.insert(key.into(), validators);
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.validators.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Validate `value` arriving at `key`.
    ///
    /// A leaf is checked by the validators registered at exactly `key`. A
    /// table is checked by every validator registered at `key` or beneath it,
    /// each receiving the sub-value at its own path; paths the table does not
    /// contain are skipped. Keys are visited in sorted order and the first
    /// failure is returned.
    pub fn run(
        &self,
        key: &str,
        value: &Value,
        splitter: &KeySplitter,
    ) -> Result<(), ValidationError> {
        let prefix = splitter.split(key);

        for (validator_key, validators) in &self.validators {
            let segments = splitter.split(validator_key);
            if segments.len() < prefix.len() || segments[..prefix.len()] != prefix[..] {
                continue;
            }
            let Some(sub_value) = value.lookup(&segments[prefix.len()..]) else {
                continue;
            };
            trace!(key = %validator_key, "running validators");
            for validate in validators {
                validate(sub_value)
                    .map_err(|source| ValidationError::new(validator_key.clone(), source))?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.validators.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}
