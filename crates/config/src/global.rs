//! Process-wide [`Config`] instance.
//!
//! Libraries that want a shared configuration without threading a handle
//! through every call can register keys and sources here. Access is
//! serialized by a mutex; a panic while it is held does not poison later
//! callers.

use std::sync::{LazyLock, Mutex, MutexGuard};

use crate::config::Config;

static GLOBAL: LazyLock<Mutex<Config>> = LazyLock::new(|| Mutex::new(Config::new()));

fn lock() -> MutexGuard<'static, Config> {
    GLOBAL
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Run `f` with exclusive access to the global configuration.
///
/// ```
/// use strata_config::{Value, global};
///
/// global::with_global(|config| {
///     config.register_key("log.level", "log verbosity", Some(Value::from("info")), Vec::new());
/// });
/// ```
pub fn with_global<R>(f: impl FnOnce(&mut Config) -> R) -> R {
    f(&mut lock())
}

/// Replace the global configuration, returning the previous one.
pub fn set_global(config: Config) -> Config {
    std::mem::replace(&mut *lock(), config)
}

/// Take the global configuration, leaving a fresh one in its place.
pub fn take_global() -> Config {
    set_global(Config::new())
}
