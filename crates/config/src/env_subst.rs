//! `${VAR}` expansion applied to file contents before decoding.
//!
//! Supported forms:
//! - `${VAR}` is replaced by the variable's value, or left as-is when unset;
//! - `${VAR:-fallback}` uses `fallback` when the variable is unset or empty;
//! - `$${VAR}` produces a literal `${VAR}`.

use std::borrow::Cow;

/// Expand placeholders using the process environment.
pub fn substitute_env(input: &str) -> Cow<'_, str> {
    substitute_env_with(input, |name| {
        std::env::var_os(name).map(|v| v.to_string_lossy().into_owned())
    })
}

/// Expand placeholders using a custom lookup function, so tests never have to
/// mutate the process environment.
pub fn substitute_env_with(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Cow<'_, str> {
    if !input.contains("${") {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                if chars.peek() == Some(&'{') {
                    result.push('$');
                } else {
                    result.push_str("$$");
                }
            },
            Some('{') => {
                chars.next();
                let mut body = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    body.push(c);
                }
                if !closed || body.is_empty() {
                    result.push_str("${");
                    result.push_str(&body);
                    if closed {
                        result.push('}');
                    }
                    continue;
                }
                let (name, fallback) = match body.split_once(":-") {
                    Some((name, fallback)) => (name, Some(fallback)),
                    None => (body.as_str(), None),
                };
                match (lookup(name), fallback) {
                    (Some(value), Some(fallback)) if value.is_empty() => {
                        result.push_str(fallback);
                    },
                    (Some(value), _) => result.push_str(&value),
                    (None, Some(fallback)) => result.push_str(fallback),
                    (None, None) => {
                        result.push_str("${");
                        result.push_str(&body);
                        result.push('}');
                    },
                }
            },
            _ => result.push('$'),
        }
    }

    Cow::Owned(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "STRATA_HOST" => Some("db.internal".to_string()),
            "STRATA_EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_env_with("host = \"${STRATA_HOST}\"", lookup),
            "host = \"db.internal\""
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_env_with("${STRATA_NONEXISTENT_XYZ}", lookup),
            "${STRATA_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn fallback_applies_to_unset_and_empty() {
        assert_eq!(substitute_env_with("${STRATA_MISSING:-5432}", lookup), "5432");
        assert_eq!(substitute_env_with("${STRATA_EMPTY:-x}", lookup), "x");
        assert_eq!(substitute_env_with("${STRATA_HOST:-x}", lookup), "db.internal");
    }

    #[test]
    fn double_dollar_escapes() {
        assert_eq!(substitute_env_with("$${STRATA_HOST}", lookup), "${STRATA_HOST}");
        assert_eq!(substitute_env_with("cost: $$5 ${STRATA_HOST}", lookup), "cost: $$5 db.internal");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_env_with("${STRATA_HOST", lookup), "${STRATA_HOST");
    }

    #[test]
    fn empty_placeholder_is_literal() {
        assert_eq!(substitute_env_with("a ${} b", lookup), "a ${} b");
    }

    #[test]
    fn no_placeholders_borrows() {
        assert!(matches!(substitute_env("plain text"), Cow::Borrowed("plain text")));
    }
}
