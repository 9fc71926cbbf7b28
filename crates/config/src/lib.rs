//! Layered configuration: register keys, add sources, parse, read.
//!
//! Values come from any number of [`Source`]s (files, environment variables,
//! in-memory tables, closures). The first source added has the highest
//! priority. Nested tables deep-merge; leaves overwrite. Keys may carry a
//! description, a default and validators, and may be marked required.
//!
//! ```no_run
//! use strata_config::{Config, EnvVars, FileSource, Value};
//!
//! let mut config = Config::new();
//! config
//!     .require_key("db.host", "database host", Vec::new())
//!     .register_key("db.port", "database port", Some(Value::from(5432)), Vec::new())
//!     .add_source(EnvVars::new("app"))
//!     .add_source(FileSource::new("app.toml"));
//! config.parse()?;
//! let port = config.get_int("db.port")?;
//! println!("connecting on {port}");
//! # Ok::<(), strata_config::Error>(())
//! ```

pub mod coerce;
pub mod config;
pub mod de;
pub mod env;
pub mod env_subst;
pub mod error;
pub mod file;
pub mod format;
pub mod global;
pub mod key;
pub mod merge;
pub mod source;
pub mod validate;
pub mod value;

pub use {
    config::{Config, ConfigOptions, DEFAULT_DESCRIPTION_WRAPPER},
    de::from_value,
    env::EnvVars,
    error::{BoxError, Error, Result, ValidationError},
    file::FileSource,
    format::{DecoderFn, Encoder, EncoderFn, FileDecoder, FormatRegistry, Json, Toml, Yaml},
    key::{DEFAULT_DELIMITER, KeySplitter},
    source::{MemorySource, Source, SourceFn},
    validate::{Validator, validator},
    value::{Table, Value},
};
