//! Deep merge of key/value pairs into an accumulating [`Table`].
//!
//! Tables merge recursively; every other value is a leaf and overwrites
//! whatever is stored at its exact path. Dotted keys are expanded into nested
//! tables on the way in, so `"a.b.c" = 1` and `{a: {b: {c: 1}}}` produce the
//! same tree.

use tracing::warn;

use crate::{
    key::KeySplitter,
    value::{Table, Value},
};

/// Merge `value` at `key` into `target`.
pub fn merge(key: &str, value: Value, target: &mut Table, splitter: &KeySplitter) {
    match splitter.split_once(key) {
        (head, Some(rest)) => with_child_table(target, head, |child| {
            merge(rest, value, child, splitter);
        }),
        (_, None) => match value {
            Value::Table(entries) => with_child_table(target, key, |child| {
                for (sub_key, sub_value) in entries {
                    merge(&sub_key, sub_value, child, splitter);
                }
            }),
            leaf => {
                target.insert(key.to_owned(), leaf);
            },
        },
    }
}

/// Merge every entry of `source` into `target`.
pub fn merge_table(source: Table, target: &mut Table, splitter: &KeySplitter) {
    for (key, value) in source {
        merge(&key, value, target, splitter);
    }
}

/// Normalize a value so that dotted keys inside tables become nested tables.
/// Leaves are returned untouched.
#[must_use]
pub fn expand(value: Value, splitter: &KeySplitter) -> Value {
    match value {
        Value::Table(entries) => {
            let mut expanded = Table::new();
            merge_table(entries, &mut expanded, splitter);
            Value::Table(expanded)
        },
        leaf => leaf,
    }
}

/// Run `f` against the table stored at `target[segment]`, creating it when
/// absent. A leaf in the way is replaced: the value being merged comes from a
/// higher priority source than whatever wrote the leaf.
fn with_child_table(target: &mut Table, segment: &str, f: impl FnOnce(&mut Table)) {
    let mut child = match target.remove(segment) {
        Some(Value::Table(table)) => table,
        Some(leaf) => {
            warn!(
                key = segment,
                replaced = leaf.kind(),
                "replacing leaf value with a nested table"
            );
            Table::new()
        },
        None => Table::new(),
    };
    f(&mut child);
    target.insert(segment.to_owned(), Value::Table(child));
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn table(json: serde_json::Value) -> Table {
        match Value::try_from(json).unwrap() {
            Value::Table(t) => t,
            other => panic!("expected table, got {}", other.kind()),
        }
    }

    #[test]
    fn dotted_keys_build_nested_tables() {
        let splitter = KeySplitter::default();
        let mut cache = Table::new();
        merge("t1.t11", Value::from("1"), &mut cache, &splitter);
        merge("t1.t12.t121", Value::from(2), &mut cache, &splitter);
        merge("t2.t21", Value::from(3.0), &mut cache, &splitter);

        assert_eq!(
            cache,
            table(serde_json::json!({
                "t1": { "t11": "1", "t12": { "t121": 2 } },
                "t2": { "t21": 3.0 }
            }))
        );
    }

    #[test]
    fn tables_deep_merge_and_leaves_overwrite() {
        let splitter = KeySplitter::default();
        let mut cache = Table::new();
        merge_table(
            table(serde_json::json!({ "x": 1, "y": { "p": 1 } })),
            &mut cache,
            &splitter,
        );
        merge_table(
            table(serde_json::json!({ "x": 2, "y": { "q": 2 } })),
            &mut cache,
            &splitter,
        );

        assert_eq!(
            cache,
            table(serde_json::json!({ "x": 2, "y": { "p": 1, "q": 2 } }))
        );
    }

    #[test]
    fn table_at_dotted_key_lands_under_its_path() {
        let splitter = KeySplitter::default();
        let mut cache = table(serde_json::json!({ "a": { "keep": true } }));
        merge(
            "a.b",
            Value::Table(table(serde_json::json!({ "c": 1 }))),
            &mut cache,
            &splitter,
        );

        assert_eq!(
            cache,
            table(serde_json::json!({ "a": { "keep": true, "b": { "c": 1 } } }))
        );
    }

    #[test]
    fn nested_leaf_replaces_scalar_parent() {
        let splitter = KeySplitter::default();
        let mut cache = table(serde_json::json!({ "db": "sqlite" }));
        merge("db.host", Value::from("localhost"), &mut cache, &splitter);

        assert_eq!(
            cache,
            table(serde_json::json!({ "db": { "host": "localhost" } }))
        );
    }

    #[test]
    fn leaf_overwrites_table() {
        let splitter = KeySplitter::default();
        let mut cache = table(serde_json::json!({ "db": { "host": "x" } }));
        merge("db", Value::from("off"), &mut cache, &splitter);
        assert_eq!(cache, table(serde_json::json!({ "db": "off" })));
    }

    #[test]
    fn arrays_are_replaced_not_merged() {
        let splitter = KeySplitter::default();
        let mut cache = table(serde_json::json!({ "hosts": ["a", "b"] }));
        merge("hosts", Value::from(vec!["c"]), &mut cache, &splitter);
        assert_eq!(cache, table(serde_json::json!({ "hosts": ["c"] })));
    }

    #[test]
    fn expand_normalizes_dotted_sub_keys() {
        let splitter = KeySplitter::default();
        let value = expand(
            Value::Table(table(serde_json::json!({ "t11.t111": true }))),
            &splitter,
        );
        assert_eq!(value.lookup(&["t11", "t111"]), Some(&Value::Boolean(true)));
    }

    #[test]
    fn custom_delimiter_is_honoured() {
        let splitter = KeySplitter::new("/");
        let mut cache = Table::new();
        merge("a/b", Value::from(1), &mut cache, &splitter);
        merge("a.c", Value::from(2), &mut cache, &splitter);
        assert_eq!(
            cache,
            table(serde_json::json!({ "a": { "b": 1 }, "a.c": 2 }))
        );
    }
}
