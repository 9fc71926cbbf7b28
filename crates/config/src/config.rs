//! The merge-resolve-validate engine.
//!
//! A [`Config`] owns the registered keys, the ordered sources and the merged
//! cache. It is a single-owner value: mutation goes through `&mut self` and
//! nothing inside is synchronized, so share it across threads only behind
//! your own lock (see [`crate::global`] for the process-wide instance).

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use {
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    tracing::{debug, warn},
};

use crate::{
    coerce, de,
    error::{Error, Result},
    format::Encoder,
    key::{DEFAULT_DELIMITER, KeySplitter},
    merge::{expand, merge},
    source::Source,
    validate::{Validator, ValidatorRegistry},
    value::{Table, Value},
};

/// Marker placed either side of a description in generated blank configs.
pub const DEFAULT_DESCRIPTION_WRAPPER: &str = "***";

/// Settings that shape the engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOptions {
    pub key_delimiter: String,
    pub description_wrapper: String,
    pub case_sensitive: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            key_delimiter: DEFAULT_DELIMITER.to_owned(),
            description_wrapper: DEFAULT_DESCRIPTION_WRAPPER.to_owned(),
            case_sensitive: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RegisteredKey {
    description: String,
    default: Option<Value>,
}

pub struct Config {
    registered: BTreeMap<String, RegisteredKey>,
    required: BTreeSet<String>,
    validators: ValidatorRegistry,
    cache: Table,
    sources: Vec<Box<dyn Source>>,
    parsed: bool,
    splitter: KeySplitter,
    description_wrapper: String,
    case_insensitive: bool,
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ConfigOptions::default())
    }

    #[must_use]
    pub fn with_options(options: ConfigOptions) -> Self {
        Self {
            registered: BTreeMap::new(),
            required: BTreeSet::new(),
            validators: ValidatorRegistry::new(),
            cache: Table::new(),
            sources: Vec::new(),
            parsed: false,
            splitter: KeySplitter::new(options.key_delimiter),
            description_wrapper: options.description_wrapper,
            case_insensitive: !options.case_sensitive,
        }
    }

    // ── Engine settings ─────────────────────────────────────────────────────

    /// Delimiter separating key path segments. Set it before registering keys
    /// or adding sources.
    pub fn set_key_delimiter(&mut self, delimiter: impl Into<String>) -> &mut Self {
        self.splitter = KeySplitter::new(delimiter);
        self
    }

    pub fn set_description_wrapper(&mut self, wrapper: impl Into<String>) -> &mut Self {
        self.description_wrapper = wrapper.into();
        self
    }

    /// When case-insensitive, keys are lowercased at registration, merge and
    /// lookup time. Set it before registering keys.
    pub fn set_case_sensitive(&mut self, case_sensitive: bool) -> &mut Self {
        self.case_insensitive = !case_sensitive;
        self
    }

    #[must_use]
    pub fn splitter(&self) -> &KeySplitter {
        &self.splitter
    }

    fn normalize<'a>(&self, key: &'a str) -> Cow<'a, str> {
        if self.case_insensitive {
            Cow::Owned(key.to_lowercase())
        } else {
            Cow::Borrowed(key)
        }
    }

    // ── Registration ────────────────────────────────────────────────────────

    /// Register a key with a description, an optional default and optional
    /// validators.
    ///
    /// Registering a key again replaces its description, replaces its default
    /// when a new one is given, and replaces its validators when the new list
    /// is non-empty.
    pub fn register_key(
        &mut self,
        name: &str,
        description: impl Into<String>,
        default: Option<Value>,
        validators: Vec<Validator>,
    ) -> &mut Self {
        let name = self.normalize(name).into_owned();
        let entry = self.registered.entry(name.clone()).or_default();
        entry.description = description.into();
        if default.is_some() {
            entry.default = default;
        }
        self.validators.register(name, validators);
        self
    }

    /// Register a key that must resolve after parsing, or [`Config::parse`]
    /// fails with [`Error::RequiredKeysMissing`].
    pub fn require_key(
        &mut self,
        name: &str,
        description: impl Into<String>,
        validators: Vec<Validator>,
    ) -> &mut Self {
        let key = self.normalize(name).into_owned();
        self.required.insert(key);
        self.register_key(name, description, None, validators)
    }

    /// Register every leaf of `defaults` as a key whose default is that leaf.
    /// Nested structs become dotted keys; `None` fields are skipped.
    pub fn register_defaults<T: Serialize>(&mut self, defaults: &T) -> Result<&mut Self> {
        let json = serde_json::to_value(defaults)
            .map_err(|e| Error::external("failed to serialize defaults", e))?;
        let Some(json) = de::strip_nulls(json) else {
            return Ok(self);
        };
        let Value::Table(table) = Value::try_from(json)? else {
            return Err(Error::UnsupportedValue {
                kind: "non-table defaults",
            });
        };

        let mut leaves = Vec::new();
        collect_leaves(&mut Vec::new(), table, &mut leaves);
        for (segments, value) in leaves {
            let key = self.splitter.join(&segments);
            self.register_key(&key, "", Some(value), Vec::new());
        }
        Ok(self)
    }

    /// Sources are consulted in reverse order of addition: the first source
    /// added has the highest priority and overrides everything after it.
    pub fn add_source(&mut self, source: impl Source + 'static) -> &mut Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Registered key names, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.registered.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn required_keys(&self) -> Vec<&str> {
        self.required.iter().map(String::as_str).collect()
    }

    #[must_use]
    pub fn description(&self, key: &str) -> Option<&str> {
        self.registered
            .get(self.normalize(key).as_ref())
            .map(|entry| entry.description.as_str())
    }

    // ── Parsing ─────────────────────────────────────────────────────────────

    /// Unmarshal every source, merge the results and check required keys.
    ///
    /// Calls accumulate: values merged by an earlier call stay in the cache
    /// unless [`Config::reset`] is called in between. A failed call leaves
    /// [`Config::parsed`] false and does not roll back merges that already
    /// happened.
    pub fn parse(&mut self) -> Result<()> {
        self.parsed = false;

        let sources = std::mem::take(&mut self.sources);
        let populated = self.populate(&sources);
        self.sources = sources;
        populated?;

        self.check_required_keys()?;
        self.parsed = true;
        debug!(
            sources = self.sources.len(),
            keys = self.registered.len(),
            "configuration parsed"
        );
        Ok(())
    }

    /// [`Config::parse`], panicking on failure. Meant for start-up code where
    /// a broken configuration should stop the process.
    pub fn must_parse(&mut self) {
        if let Err(e) = self.parse() {
            panic!("failed to parse configuration: {e}");
        }
    }

    /// Whether the most recent [`Config::parse`] succeeded.
    #[must_use]
    pub fn parsed(&self) -> bool {
        self.parsed
    }

    /// Clear merged values and the parsed flag. Registrations and sources are
    /// kept.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.parsed = false;
    }

    fn populate(&mut self, sources: &[Box<dyn Source>]) -> Result<()> {
        let expected_keys: Vec<String> = self.registered.keys().cloned().collect();

        for source in sources.iter().rev() {
            let values = source.unmarshal(&expected_keys, &self.splitter)?;
            debug!(source = %source.name(), entries = values.len(), "merging source");
            for (key, value) in values {
                self.set(&key, value)?;
            }
        }
        Ok(())
    }

    /// Validate `value` and merge it into the cache at `key`.
    ///
    /// Nothing is merged when validation fails.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let key = self.normalize(key).into_owned();
        let value = if self.case_insensitive {
            value.lowercase_keys()
        } else {
            value
        };
        let value = expand(value, &self.splitter);

        self.validators.run(&key, &value, &self.splitter)?;
        merge(&key, value, &mut self.cache, &self.splitter);
        Ok(())
    }

    fn check_required_keys(&self) -> Result<()> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|key| self.resolve(key).is_err())
            .cloned()
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        warn!(missing = ?missing, "required configuration keys missing");
        Err(Error::RequiredKeysMissing { keys: missing })
    }

    // ── Lookup ──────────────────────────────────────────────────────────────

    /// Resolve `key` against the merged values, then the registered defaults.
    ///
    /// Nested keys use the delimiter (`"user.age.month"`); a key naming a table
    /// returns the whole table.
    pub fn get(&self, key: &str) -> Result<&Value> {
        if !self.parsed {
            return Err(Error::ParseNotCalled);
        }
        self.resolve(key)
    }

    fn resolve(&self, key: &str) -> Result<&Value> {
        let key = self.normalize(key);

        if let Some(value) = self.cache.get(key.as_ref()) {
            return Ok(value);
        }

        let segments = self.splitter.split(&key);
        if let Some((head, rest)) = segments.split_first()
            && let Some(value) = self.cache.get(*head).and_then(|v| v.lookup(rest))
        {
            return Ok(value);
        }

        self.registered
            .get(key.as_ref())
            .and_then(|entry| entry.default.as_ref())
            .ok_or_else(|| Error::key_not_found(key.as_ref()))
    }

    /// Whether `key` resolves, either from a source or from a default.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_ok()
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        coerce::to_string(key, self.get(key)?)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        coerce::to_bool(key, self.get(key)?)
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        coerce::to_int(key, self.get(key)?)
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        coerce::to_float(key, self.get(key)?)
    }

    /// The merged values, without defaults.
    #[must_use]
    pub fn values(&self) -> &Table {
        &self.cache
    }

    /// Defaults overlaid by the merged values, as one nested tree.
    pub fn resolved(&self) -> Result<Table> {
        if !self.parsed {
            return Err(Error::ParseNotCalled);
        }
        Ok(self.resolved_tree())
    }

    fn resolved_tree(&self) -> Table {
        let mut tree = Table::new();
        for (key, entry) in &self.registered {
            if let Some(default) = &entry.default {
                merge(key, default.clone(), &mut tree, &self.splitter);
            }
        }
        for (key, value) in &self.cache {
            merge(key, value.clone(), &mut tree, &self.splitter);
        }
        tree
    }

    // ── Decoding ────────────────────────────────────────────────────────────

    /// Decode every resolved value (defaults included) into `T`.
    pub fn unmarshal<T: DeserializeOwned>(&self) -> Result<T> {
        de::from_value(&Value::Table(self.resolved()?))
    }

    /// Decode the value [`Config::get`] returns for `key` into `T`. A table
    /// also picks up defaults registered beneath it. An empty key decodes the
    /// whole tree like [`Config::unmarshal`].
    pub fn unmarshal_key<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        if key.is_empty() {
            return self.unmarshal();
        }
        let value = self.get(key)?;
        if !value.is_table() {
            return de::from_value(value);
        }

        let tree = Value::Table(self.resolved_tree());
        let key = self.normalize(key);
        match tree.lookup(&self.splitter.split(&key)) {
            Some(subtree) if subtree.is_table() => de::from_value(subtree),
            _ => de::from_value(value),
        }
    }

    // ── Blank generation ────────────────────────────────────────────────────

    /// Encode a placeholder config holding every registered key: its default
    /// when it has one, otherwise its description wrapped in the description
    /// marker (`"*** description ***"`).
    pub fn generate_blank(&self, encoder: &dyn Encoder) -> Result<Vec<u8>> {
        if self.registered.is_empty() {
            return Err(Error::NoRegisteredValues);
        }

        let mut blank = Table::new();
        for (key, entry) in &self.registered {
            let value = match &entry.default {
                Some(default) => default.clone(),
                None => Value::String(self.wrap_description(&entry.description)),
            };
            merge(key, value, &mut blank, &self.splitter);
        }
        encoder.marshal(&Value::Table(blank))
    }

    fn wrap_description(&self, description: &str) -> String {
        [
            self.description_wrapper.as_str(),
            description,
            self.description_wrapper.as_str(),
        ]
        .join(" ")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("registered", &self.registered.keys().collect::<Vec<_>>())
            .field("required", &self.required)
            .field("validators", &self.validators)
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("parsed", &self.parsed)
            .field("delimiter", &self.splitter.delimiter())
            .field("case_insensitive", &self.case_insensitive)
            .finish_non_exhaustive()
    }
}

fn collect_leaves(prefix: &mut Vec<String>, table: Table, out: &mut Vec<(Vec<String>, Value)>) {
    for (key, value) in table {
        prefix.push(key);
        match value {
            Value::Table(nested) => collect_leaves(prefix, nested, out),
            leaf => out.push((prefix.clone(), leaf)),
        }
        prefix.pop();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use {
        super::*,
        crate::{
            error::BoxError,
            format::{EncoderFn, Json},
            source::{MemorySource, SourceFn},
            validate::validator,
        },
    };

    fn table(json: serde_json::Value) -> Table {
        match Value::try_from(json).unwrap() {
            Value::Table(t) => t,
            other => panic!("expected table, got {}", other.kind()),
        }
    }

    fn memory(json: serde_json::Value) -> MemorySource {
        MemorySource::new(table(json))
    }

    fn failing_source() -> SourceFn<impl Fn(&[String], &KeySplitter) -> Result<Table> + Send + Sync>
    {
        SourceFn::new("broken", |_: &[String], _: &KeySplitter| -> Result<Table> {
            Err(Error::external("broken source", "disk on fire"))
        })
    }

    #[test]
    fn source_error_aborts_parse() {
        let mut config = Config::new();
        config.add_source(failing_source());

        let err = config.parse().unwrap_err();

        assert!(matches!(err, Error::External { .. }));
        assert!(!config.parsed());
    }

    #[test]
    fn successful_parse_sets_parsed() {
        let mut config = Config::new();
        config.add_source(memory(serde_json::json!({ "t1": 1 })));
        config.parse().unwrap();
        assert!(config.parsed());
    }

    #[test]
    fn failed_reparse_clears_parsed() {
        let mut config = Config::new();
        config.add_source(memory(serde_json::json!({ "t1": 1 })));
        config.parse().unwrap();

        config.require_key("t2", "", Vec::new());
        assert!(config.parse().is_err());
        assert!(!config.parsed());
        assert!(matches!(config.get("t1"), Err(Error::ParseNotCalled)));
    }

    #[test]
    #[should_panic(expected = "failed to parse configuration")]
    fn must_parse_panics_on_error() {
        let mut config = Config::new();
        config.add_source(failing_source());
        config.must_parse();
    }

    #[test]
    fn must_parse_accepts_unregistered_keys() {
        let mut config = Config::new();
        config.add_source(memory(serde_json::json!({ "t1": 1, "t2": 2, "t3": 3 })));
        config.must_parse();
        assert_eq!(config.get_int("t3").unwrap(), 3);
    }

    #[test]
    fn populates_cache_from_source() {
        let mut config = Config::new();
        let values = serde_json::json!({ "t1": 1, "t2": 2, "t3": 3 });
        config.add_source(memory(values.clone()));
        config.parse().unwrap();
        assert_eq!(config.values(), &table(values));
    }

    #[test]
    fn validator_failure_aborts_parse() {
        let mut config = Config::new();
        config.register_key("t2", "", None, vec![validator(|_| Err("!"))]);
        config.add_source(memory(serde_json::json!({ "t1": 1, "t2": 2, "t3": 3 })));

        let err = config.parse().unwrap_err();

        match err {
            Error::Validation(e) => assert_eq!(e.key, "t2"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejected_value_is_not_merged() {
        let mut config = Config::new();
        config.register_key(
            "email",
            "",
            None,
            vec![validator(|v: &Value| {
                if v.as_str().is_some_and(|s| s.contains('@')) {
                    Ok(())
                } else {
                    Err(format!("'{v}' is not an email address"))
                }
            })],
        );

        let err = config.set("email", Value::from("not-an-email")).unwrap_err();

        match err {
            Error::Validation(e) => {
                assert_eq!(e.key, "email");
                assert_eq!(e.source.to_string(), "'not-an-email' is not an email address");
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(config.values().get("email").is_none());
        config.set("email", Value::from("ops@example.com")).unwrap();
        assert_eq!(config.values().get("email"), Some(&Value::from("ops@example.com")));
    }

    #[test]
    fn nested_validators_run_for_submitted_table() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut config = Config::new();
        for key in ["t1.t11.t111", "t1.t12.t121"] {
            let calls = Arc::clone(&calls);
            config.register_key(
                key,
                "",
                None,
                vec![validator(move |v: &Value| {
                    assert_eq!(v, &Value::Boolean(true));
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                })],
            );
        }

        config
            .set(
                "t1",
                Value::Table(table(serde_json::json!({
                    "t11": { "t111": true },
                    "t12.t121": true
                }))),
            )
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn first_added_source_wins() {
        let mut config = Config::new();
        config.add_source(memory(serde_json::json!({ "t1": 1, "t3": 4 })));
        config.add_source(memory(serde_json::json!({ "t2": 2, "t3": 3 })));
        config.parse().unwrap();

        assert_eq!(
            config.values(),
            &table(serde_json::json!({ "t1": 1, "t2": 2, "t3": 4 }))
        );
    }

    #[test]
    fn nested_values_merge_across_sources() {
        let mut config = Config::new();
        config.add_source(memory(serde_json::json!({
            "t1": false,
            "t2": { "t22": 5 },
            "t3": { "t31": { "t312": 6 } }
        })));
        config.add_source(memory(serde_json::json!({
            "t1": true,
            "t2": { "t21": 1, "t22": 2 },
            "t3": { "t31": { "t311": 3, "t312": 4 } }
        })));
        config.parse().unwrap();

        assert_eq!(
            config.values(),
            &table(serde_json::json!({
                "t1": false,
                "t2": { "t21": 1, "t22": 5 },
                "t3": { "t31": { "t311": 3, "t312": 6 } }
            }))
        );
    }

    #[test]
    fn path_style_keys_set_nested_values() {
        let mut config = Config::new();
        config.set("t1.t11", Value::from("1")).unwrap();
        config.set("t1.t12.t121", Value::from(2)).unwrap();
        config.set("t2.t21", Value::from(3.0)).unwrap();

        assert_eq!(
            config.values(),
            &table(serde_json::json!({
                "t1": { "t11": "1", "t12": { "t121": 2 } },
                "t2": { "t21": 3.0 }
            }))
        );
    }

    #[test]
    fn retrieves_nested_values_and_tables() {
        let mut config = Config::new();
        config.add_source(memory(serde_json::json!({
            "t1": { "t11": 1 },
            "t2": { "t21": { "t211": 2 } },
            "t3": { "31": 3 }
        })));
        config.parse().unwrap();

        assert_eq!(config.get("t1.t11").unwrap(), &Value::Integer(1));
        assert_eq!(config.get("t2.t21.t211").unwrap(), &Value::Integer(2));
        assert_eq!(config.get("t3.31").unwrap(), &Value::Integer(3));
        assert_eq!(
            config.get("t2").unwrap(),
            &Value::Table(table(serde_json::json!({ "t21": { "t211": 2 } })))
        );
        assert!(matches!(
            config.get("t1.t11.deeper"),
            Err(Error::KeyNotFound { key }) if key == "t1.t11.deeper"
        ));
    }

    #[test]
    fn required_keys_are_reported_together() {
        let mut config = Config::new();
        config.add_source(memory(serde_json::json!({
            "t1": 1,
            "t3": 3,
            "t4": { "t41": { "t411": 4 } }
        })));
        config.require_key("t1", "", Vec::new());
        config.require_key("t3.t31", "", Vec::new());
        config.require_key("t2", "", Vec::new());
        config.require_key("t4.t41.t411", "", Vec::new());

        let err = config.parse().unwrap_err();

        assert_eq!(err.missing_keys(), ["t2", "t3.t31"]);
        assert_eq!(
            err.to_string(),
            "missing required configuration values: [t2, t3.t31]"
        );
    }

    #[test]
    fn required_key_satisfied_by_default() {
        let mut config = Config::new();
        config.register_key("port", "", Some(Value::from(8080)), Vec::new());
        config.require_key("port", "listening port", Vec::new());
        config.parse().unwrap();
        assert_eq!(config.get_int("port").unwrap(), 8080);
        assert_eq!(config.description("port"), Some("listening port"));
    }

    #[test]
    fn get_before_parse_fails() {
        let mut config = Config::new();
        config.register_key("test", "", Some(Value::from(1)), Vec::new());
        assert!(matches!(config.get("test"), Err(Error::ParseNotCalled)));
        assert!(matches!(config.get_int("test"), Err(Error::ParseNotCalled)));
    }

    #[test]
    fn default_used_when_no_source_supplies_key() {
        let mut config = Config::new();
        config.register_key("test", "its a test!", Some(Value::from(1)), Vec::new());
        config.parse().unwrap();
        assert_eq!(config.get("test").unwrap(), &Value::Integer(1));
    }

    #[test]
    fn source_value_beats_default() {
        let mut config = Config::new();
        config.register_key("db.port", "", Some(Value::from(5432)), Vec::new());
        config.add_source(memory(serde_json::json!({ "db": { "port": 6543 } })));
        config.parse().unwrap();
        assert_eq!(config.get_int("db.port").unwrap(), 6543);
    }

    #[test]
    fn typed_accessors_coerce() {
        let mut config = Config::new();
        config.add_source(memory(serde_json::json!({
            "s": "1", "f": "2.5", "b": "true", "i": 7
        })));
        config.parse().unwrap();

        assert_eq!(config.get_int("s").unwrap(), 1);
        assert_eq!(config.get_float("f").unwrap(), 2.5);
        assert!(config.get_bool("b").unwrap());
        assert_eq!(config.get_string("i").unwrap(), "7");
        assert!(matches!(config.get_int("f"), Err(Error::Coercion { .. })));
        assert!(matches!(config.get_int("nope"), Err(Error::KeyNotFound { .. })));
    }

    #[test]
    fn case_insensitive_keys() {
        let mut config = Config::new();
        config.set_case_sensitive(false);
        config.register_key("DB.Port", "", Some(Value::from(1)), Vec::new());
        config.add_source(memory(serde_json::json!({ "Db": { "Host": "h" } })));
        config.parse().unwrap();

        assert_eq!(config.keys(), vec!["db.port"]);
        assert_eq!(config.get_string("DB.HOST").unwrap(), "h");
        assert_eq!(config.get_int("db.PORT").unwrap(), 1);
    }

    #[test]
    fn custom_delimiter() {
        let mut config = Config::new();
        config.set_key_delimiter("/");
        config.add_source(memory(serde_json::json!({ "a/b": 1 })));
        config.parse().unwrap();
        assert_eq!(config.get_int("a/b").unwrap(), 1);
        assert!(config.get("a").unwrap().is_table());
    }

    #[test]
    fn repeated_parse_accumulates_until_reset() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut config = Config::new();
        config.add_source(SourceFn::new(
            "counter",
            move |_: &[String], _: &KeySplitter| -> Result<Table> {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let mut values = Table::new();
                values.insert(format!("run{n}"), Value::from(true));
                Ok(values)
            },
        ));

        config.parse().unwrap();
        config.parse().unwrap();
        assert!(config.contains("run0"));
        assert!(config.contains("run1"));

        config.reset();
        assert!(!config.parsed());
        config.parse().unwrap();
        assert!(!config.contains("run0"));
        assert!(config.contains("run2"));
    }

    #[test]
    fn sources_receive_sorted_registered_keys() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut config = Config::new();
        config.register_key("b", "", None, Vec::new());
        config.require_key("a.z", "", Vec::new());
        config.add_source(SourceFn::new(
            "spy",
            move |keys: &[String], _: &KeySplitter| -> Result<Table> {
                sink.lock().unwrap().extend_from_slice(keys);
                Ok(table(serde_json::json!({ "a.z": 1 })))
            },
        ));

        config.parse().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a.z".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn blank_requires_registered_keys() {
        let config = Config::new();
        assert!(matches!(
            config.generate_blank(&Json),
            Err(Error::NoRegisteredValues)
        ));
    }

    #[test]
    fn blank_uses_defaults_then_wrapped_descriptions() {
        let mut config = Config::new();
        config.register_key("t1", "test 1", Some(Value::from(1)), Vec::new());
        config.register_key("t2.t21", "test 2", Some(Value::from("2")), Vec::new());
        config.require_key("t3.t31", "d", Vec::new());

        let captured = std::cell::RefCell::new(None);
        let encoder = EncoderFn(|value: &Value| -> Result<Vec<u8>> {
            *captured.borrow_mut() = Some(value.clone());
            Ok(Vec::new())
        });
        config.generate_blank(&encoder).unwrap();

        assert_eq!(
            captured.into_inner(),
            Some(Value::Table(table(serde_json::json!({
                "t1": 1,
                "t2": { "t21": "2" },
                "t3": { "t31": "*** d ***" }
            }))))
        );
    }

    #[test]
    fn blank_honours_custom_wrapper() {
        let mut config = Config::new();
        config.set_description_wrapper("##");
        config.require_key("name", "your name", Vec::new());
        let out = config.generate_blank(&Json).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\n  \"name\": \"## your name ##\"\n}"
        );
    }

    #[derive(Debug, Deserialize, Serialize, PartialEq, Default)]
    #[serde(rename_all = "camelCase")]
    struct Email {
        from_address: String,
        #[serde(default)]
        subject: String,
        #[serde(rename = "maximumRetries")]
        max_retries: i32,
        retry_on_fail: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
    }

    #[test]
    fn registers_defaults_from_struct() {
        let mut config = Config::new();
        config
            .register_defaults(&Email {
                retry_on_fail: true,
                ..Email::default()
            })
            .unwrap();
        config.require_key("fromAddress", "", Vec::new());
        config.add_source(memory(serde_json::json!({
            "fromAddress": "test@testing.com",
            "maximumRetries": 3
        })));
        config.parse().unwrap();

        assert_eq!(
            config.keys(),
            vec![
                "fromAddress",
                "maximumRetries",
                "retryOnFail",
                "subject"
            ]
        );
        let email: Email = config.unmarshal().unwrap();
        assert_eq!(
            email,
            Email {
                from_address: "test@testing.com".into(),
                subject: String::new(),
                max_retries: 3,
                retry_on_fail: true,
                reply_to: None,
            }
        );
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Database {
        host: String,
        port: u16,
    }

    #[test]
    fn unmarshal_key_decodes_subtree_with_defaults() {
        let mut config = Config::new();
        config.register_key("db.port", "", Some(Value::from(5432)), Vec::new());
        config.add_source(memory(serde_json::json!({ "db": { "host": "localhost" } })));
        config.parse().unwrap();

        let db: Database = config.unmarshal_key("db").unwrap();

        assert_eq!(
            db,
            Database {
                host: "localhost".into(),
                port: 5432,
            }
        );
        assert!(matches!(
            config.unmarshal_key::<Database>("cache"),
            Err(Error::KeyNotFound { .. })
        ));
    }

    #[test]
    fn unmarshal_key_falls_back_to_default_under_source_leaf() {
        let mut config = Config::new();
        config.register_key("db.port", "", Some(Value::from(5432)), Vec::new());
        config.add_source(memory(serde_json::json!({ "db": "off" })));
        config.parse().unwrap();

        assert_eq!(config.get_int("db.port").unwrap(), 5432);
        assert_eq!(config.unmarshal_key::<u16>("db.port").unwrap(), 5432);
        assert_eq!(config.unmarshal_key::<String>("db").unwrap(), "off");
    }

    #[test]
    fn rejected_nested_value_in_table_stops_merge() {
        let mut config = Config::new();
        config.register_key(
            "db.port",
            "",
            None,
            vec![validator(|v: &Value| match coerce::as_int(v) {
                Some(port) if port > 0 => Ok(()),
                _ => Err("bad port"),
            })],
        );
        // Sources merge last-added first: "app" lands before "db" is rejected.
        config.add_source(memory(serde_json::json!({
            "db": { "host": "h", "port": -1 }
        })));
        config.add_source(memory(serde_json::json!({ "app": "strata" })));

        let err = config.parse().unwrap_err();

        match &err {
            Error::Validation(e) => assert_eq!(e.key, "db.port"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            err.to_string(),
            "validation error on key 'db.port': bad port"
        );
        assert!(config.values().get("db").is_none());
        assert_eq!(config.values().get("app"), Some(&Value::from("strata")));
        assert!(!config.parsed());
    }

    #[test]
    fn unmarshal_before_parse_fails() {
        let config = Config::new();
        assert!(matches!(
            config.unmarshal::<Database>(),
            Err(Error::ParseNotCalled)
        ));
    }
}
