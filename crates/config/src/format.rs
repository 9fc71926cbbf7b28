//! File formats: decoders, encoders and the extension lookup table.
//!
//! A [`FormatRegistry`] maps a format name (`"toml"`) to its decoder and
//! encoder, and file extensions (`"yml"`) to format names. The default
//! registry knows `json`, `toml` and `yaml`.

use std::{
    collections::HashMap,
    fmt,
    path::Path,
    sync::{Arc, LazyLock},
};

use crate::{
    error::{Error, Result},
    value::{Table, Value},
};

/// Turns raw file contents into a [`Table`].
pub trait FileDecoder: Send + Sync {
    fn unmarshal(&self, bytes: &[u8]) -> Result<Table>;
}

/// Turns a value tree into bytes.
pub trait Encoder {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>>;
}

/// Adapts a closure into a [`FileDecoder`].
pub struct DecoderFn<F>(pub F);

impl<F> FileDecoder for DecoderFn<F>
where
    F: Fn(&[u8]) -> Result<Table> + Send + Sync,
{
    fn unmarshal(&self, bytes: &[u8]) -> Result<Table> {
        (self.0)(bytes)
    }
}

/// Adapts a closure into an [`Encoder`].
pub struct EncoderFn<F>(pub F);

impl<F> Encoder for EncoderFn<F>
where
    F: Fn(&Value) -> Result<Vec<u8>>,
{
    fn marshal(&self, value: &Value) -> Result<Vec<u8>> {
        (self.0)(value)
    }
}

// ── Built-in formats ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

#[derive(Debug, Clone, Copy, Default)]
pub struct Toml;

#[derive(Debug, Clone, Copy, Default)]
pub struct Yaml;

impl FileDecoder for Json {
    fn unmarshal(&self, bytes: &[u8]) -> Result<Table> {
        let raw: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| Error::decode("json", e))?;
        into_table("json", Value::try_from(raw)?)
    }
}

impl Encoder for Json {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(value).map_err(|e| Error::encode("json", e))
    }
}

impl FileDecoder for Toml {
    fn unmarshal(&self, bytes: &[u8]) -> Result<Table> {
        let text = std::str::from_utf8(bytes).map_err(|e| Error::decode("toml", e))?;
        let raw: toml::Value = toml::from_str(text).map_err(|e| Error::decode("toml", e))?;
        into_table("toml", Value::from(raw))
    }
}

impl Encoder for Toml {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>> {
        toml::to_string_pretty(value)
            .map(String::into_bytes)
            .map_err(|e| Error::encode("toml", e))
    }
}

impl FileDecoder for Yaml {
    fn unmarshal(&self, bytes: &[u8]) -> Result<Table> {
        let raw: serde_yaml::Value =
            serde_yaml::from_slice(bytes).map_err(|e| Error::decode("yaml", e))?;
        // An empty document decodes to null.
        if raw.is_null() {
            return Ok(Table::new());
        }
        into_table("yaml", Value::try_from(raw)?)
    }
}

impl Encoder for Yaml {
    fn marshal(&self, value: &Value) -> Result<Vec<u8>> {
        serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| Error::encode("yaml", e))
    }
}

fn into_table(format: &str, value: Value) -> Result<Table> {
    match value {
        Value::Table(table) => Ok(table),
        other => Err(Error::decode(
            format,
            format!("top-level value must be a table, found {}", other.kind()),
        )),
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

static BUILTIN: LazyLock<Arc<FormatRegistry>> =
    LazyLock::new(|| Arc::new(FormatRegistry::default()));

/// Format name → decoder/encoder, plus extension alias → format name.
pub struct FormatRegistry {
    decoders: HashMap<String, Arc<dyn FileDecoder>>,
    encoders: HashMap<String, Arc<dyn Encoder + Send + Sync>>,
    extensions: HashMap<String, String>,
}

impl FormatRegistry {
    /// A registry with no formats at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
            encoders: HashMap::new(),
            extensions: HashMap::new(),
        }
    }

    /// Shared instance of the default registry.
    #[must_use]
    pub fn builtin() -> Arc<Self> {
        Arc::clone(&BUILTIN)
    }

    /// Register `decoder` under `name`, reachable from each extension in
    /// `aliases`. Re-registering a name replaces the previous decoder.
    pub fn register_decoder(
        &mut self,
        name: &str,
        decoder: impl FileDecoder + 'static,
        aliases: &[&str],
    ) -> &mut Self {
        self.decoders.insert(name.to_owned(), Arc::new(decoder));
        self.add_aliases(name, aliases);
        self
    }

    pub fn register_encoder(
        &mut self,
        name: &str,
        encoder: impl Encoder + Send + Sync + 'static,
        aliases: &[&str],
    ) -> &mut Self {
        self.encoders.insert(name.to_owned(), Arc::new(encoder));
        self.add_aliases(name, aliases);
        self
    }

    fn add_aliases(&mut self, name: &str, aliases: &[&str]) {
        for alias in aliases {
            self.extensions
                .insert(alias.to_ascii_lowercase(), name.to_owned());
        }
    }

    /// Format name registered for a file extension (case-insensitive, with or
    /// without the leading dot).
    #[must_use]
    pub fn format_for_extension(&self, extension: &str) -> Option<&str> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.extensions.get(&extension).map(String::as_str)
    }

    #[must_use]
    pub fn format_for_path(&self, path: &Path) -> Option<&str> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.format_for_extension(ext))
    }

    pub fn decoder(&self, name: &str) -> Result<&dyn FileDecoder> {
        self.decoders
            .get(name)
            .map(|decoder| &**decoder)
            .ok_or_else(|| Error::unknown_encoding(name))
    }

    pub fn encoder(&self, name: &str) -> Result<&dyn Encoder> {
        match self.encoders.get(name) {
            Some(encoder) => Ok(&**encoder),
            None => Err(Error::unknown_encoding(name)),
        }
    }

    /// Sorted names of every format with a decoder or an encoder.
    #[must_use]
    pub fn formats(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .decoders
            .keys()
            .chain(self.encoders.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register_decoder("json", Json, &["json"])
            .register_encoder("json", Json, &["json"])
            .register_decoder("toml", Toml, &["toml"])
            .register_encoder("toml", Toml, &["toml"])
            .register_decoder("yaml", Yaml, &["yaml", "yml"])
            .register_encoder("yaml", Yaml, &["yaml", "yml"]);
        registry
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.formats())
            .field("extensions", &self.extensions)
            .finish()
    }
}
