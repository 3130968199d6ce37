use std::sync::{Mutex, OnceLock};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Runs `run` with `vars` applied to the process environment, then restores
/// the previous values.
///
/// `None` removes the variable for the duration of the call. The environment
/// lock is held throughout, so parallel tests never observe each other's
/// variables.
pub(crate) fn with_env<R>(vars: &[(&str, Option<&str>)], run: impl FnOnce() -> R) -> R {
    let _guard = env_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let previous: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(key, _)| (key.to_string(), std::env::var(key).ok()))
        .collect();
    for (key, value) in vars {
        apply(key, *value);
    }

    let result = run();

    for (key, value) in &previous {
        apply(key, value.as_deref());
    }
    result
}

fn apply(key: &str, value: Option<&str>) {
    // SAFETY: callers hold the environment lock for the whole mutation.
    unsafe {
        match value {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
}
