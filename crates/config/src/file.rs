//! File-backed source.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    format::{Encoder, FileDecoder, FormatRegistry},
    key::KeySplitter,
    source::Source,
    value::{Table, Value},
};

/// Reads and decodes a single configuration file.
///
/// The format is inferred from the file extension when the source is built or
/// its path changes, and can be overridden with [`FileSource::set_format`].
/// A file whose format cannot be determined fails with
/// [`Error::UnknownEncoding`] when it is read, not when it is constructed.
///
/// A `FileSource` is also an [`Encoder`] for its format, which makes it a
/// convenient target for [`crate::Config::generate_blank`].
#[derive(Clone)]
pub struct FileSource {
    path: PathBuf,
    format: Option<String>,
    registry: Arc<FormatRegistry>,
    substitute_env: bool,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_registry(path, FormatRegistry::builtin())
    }

    pub fn with_registry(path: impl Into<PathBuf>, registry: Arc<FormatRegistry>) -> Self {
        let mut source = Self {
            path: PathBuf::new(),
            format: None,
            registry,
            substitute_env: false,
        };
        source.set_path(path);
        source
    }

    /// Change the file path and re-infer the format from its extension.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
        self.format = self
            .registry
            .format_for_path(&self.path)
            .map(str::to_owned);
    }

    /// Override the inferred format by name (e.g. `"toml"`).
    pub fn set_format(&mut self, format: impl Into<String>) {
        self.format = Some(format.into());
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.set_format(format);
        self
    }

    /// Expand `${VAR}` placeholders in the file text before decoding.
    #[must_use]
    pub fn with_env_substitution(mut self, enabled: bool) -> Self {
        self.substitute_env = enabled;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    fn format_name(&self) -> Result<&str> {
        self.format.as_deref().ok_or_else(|| {
            Error::unknown_encoding(
                self.path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or_default(),
            )
        })
    }

    fn decoder(&self) -> Result<&dyn FileDecoder> {
        self.registry.decoder(self.format_name()?)
    }
}

impl Source for FileSource {
    fn unmarshal(&self, _expected_keys: &[String], _splitter: &KeySplitter) -> Result<Table> {
        let decoder = self.decoder()?;
        let bytes = std::fs::read(&self.path).map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), format = ?self.format, "reading config file");

        if !self.substitute_env {
            return decoder.unmarshal(&bytes);
        }
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::decode(self.format_name().unwrap_or_default(), e))?;
        decoder.unmarshal(substitute_env(&text).as_bytes())
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

impl Encoder for FileSource {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>> {
        self.registry.encoder(self.format_name()?)?.marshal(value)
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSource")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("substitute_env", &self.substitute_env)
            .finish_non_exhaustive()
    }
}
