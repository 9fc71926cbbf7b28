//! Key path splitting.
//!
//! A key such as `"person.height.inches"` addresses the leaf `inches` inside
//! the table `height` inside the table `person`.

/// Delimiter used when none is configured.
pub const DEFAULT_DELIMITER: &str = ".";

/// Splits key paths into their segments on a fixed delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySplitter {
    delimiter: String,
}

impl KeySplitter {
    /// An empty delimiter never splits: every key is a single segment.
    #[must_use]
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// `"a.b.c"` → `["a", "b", "c"]`. A key without the delimiter yields itself.
    #[must_use]
    pub fn split<'a>(&self, key: &'a str) -> Vec<&'a str> {
        if self.delimiter.is_empty() {
            return vec![key];
        }
        key.split(self.delimiter.as_str()).collect()
    }

    /// Split on the first delimiter only: `"a.b.c"` → `("a", Some("b.c"))`.
    #[must_use]
    pub fn split_once<'a>(&self, key: &'a str) -> (&'a str, Option<&'a str>) {
        if self.delimiter.is_empty() {
            return (key, None);
        }
        match key.split_once(self.delimiter.as_str()) {
            Some((head, rest)) => (head, Some(rest)),
            None => (key, None),
        }
    }

    #[must_use]
    pub fn join<S: AsRef<str>>(&self, segments: &[S]) -> String {
        segments
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(&self.delimiter)
    }

    /// Whether `key` equals `prefix` or lies underneath it, compared segment-wise.
    #[must_use]
    pub fn is_nested_under(&self, key: &str, prefix: &str) -> bool {
        let key = self.split(key);
        let prefix = self.split(prefix);
        key.len() >= prefix.len() && key[..prefix.len()] == prefix[..]
    }
}

impl Default for KeySplitter {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}
