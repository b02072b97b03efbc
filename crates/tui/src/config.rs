use std::cell::RefCell;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_URL: &str = "http://127.0.0.1:8123";
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(3);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Fixed runtime parameters. There are no flags and no config file; each
/// value has a default that an environment variable may override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub refresh: Duration,
    pub timeout: Duration,
    pub export_dir: PathBuf,
    pub log_filter: Option<String>,
    /// `(variable, value)` pairs that were set but could not be used.
    pub ignored: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            user: None,
            password: None,
            refresh: DEFAULT_REFRESH,
            timeout: DEFAULT_TIMEOUT,
            export_dir: std::env::temp_dir(),
            log_filter: None,
            ignored: Vec::new(),
        }
    }
}

impl Config {
    /// Report ignored values. Call once logging is up, otherwise the
    /// warnings go nowhere.
    pub fn warn_ignored(&self) {
        for (key, raw) in &self.ignored {
            warn!("ignoring {key}={raw:?}: expected a positive number of seconds");
        }
    }
}

/// Load from `CHTOP_*` environment variables.
pub fn load() -> Config {
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a config from any key lookup; blank values count as unset.
pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Config {
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let ignored = RefCell::new(Vec::new());
    let seconds = |key: &str| {
        let raw = get(key)?;
        let parsed = parse_seconds(&raw);
        if parsed.is_none() {
            ignored.borrow_mut().push((key.to_string(), raw));
        }
        parsed
    };
    let defaults = Config::default();

    let refresh = seconds("CHTOP_REFRESH_SECS").unwrap_or(defaults.refresh);
    let timeout = seconds("CHTOP_TIMEOUT_SECS").unwrap_or(defaults.timeout);

    Config {
        url: get("CHTOP_URL").unwrap_or(defaults.url),
        user: get("CHTOP_USER"),
        password: get("CHTOP_PASSWORD"),
        refresh,
        timeout,
        export_dir: get("CHTOP_EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.export_dir),
        log_filter: get("CHTOP_LOG"),
        ignored: ignored.into_inner(),
    }
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]);
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.refresh, DEFAULT_REFRESH);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.user.is_none());
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn overrides_are_read_and_trimmed() {
        let config = config_from(&[
            ("CHTOP_URL", " http://ch.internal:8123 "),
            ("CHTOP_USER", "ops"),
            ("CHTOP_REFRESH_SECS", "1.5"),
            ("CHTOP_TIMEOUT_SECS", "10"),
            ("CHTOP_EXPORT_DIR", "/var/tmp/chtop"),
            ("CHTOP_LOG", "chtop_tui=debug"),
        ]);
        assert_eq!(config.url, "http://ch.internal:8123");
        assert_eq!(config.user.as_deref(), Some("ops"));
        assert_eq!(config.refresh, Duration::from_millis(1500));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.export_dir, PathBuf::from("/var/tmp/chtop"));
        assert_eq!(config.log_filter.as_deref(), Some("chtop_tui=debug"));
    }

    #[test]
    fn invalid_durations_fall_back_to_defaults() {
        let config = config_from(&[
            ("CHTOP_REFRESH_SECS", "soon"),
            ("CHTOP_TIMEOUT_SECS", "-4"),
            ("CHTOP_PASSWORD", "   "),
        ]);
        assert_eq!(config.refresh, DEFAULT_REFRESH);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.password.is_none());
        assert_eq!(
            config.ignored,
            [
                ("CHTOP_REFRESH_SECS".to_string(), "soon".to_string()),
                ("CHTOP_TIMEOUT_SECS".to_string(), "-4".to_string()),
            ]
        );
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn ignored_values_are_logged_once_a_subscriber_exists() {
        let config = config_from(&[("CHTOP_REFRESH_SECS", "soon")]);
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || config.warn_ignored());

        let out = String::from_utf8(captured.0.lock().expect("lock").clone()).expect("utf8");
        assert!(out.contains("WARN"));
        assert!(out.contains("CHTOP_REFRESH_SECS=\"soon\""));
    }

    #[test]
    fn valid_values_leave_nothing_ignored() {
        let config = config_from(&[("CHTOP_REFRESH_SECS", "2"), ("CHTOP_TIMEOUT_SECS", "0.5")]);
        assert!(config.ignored.is_empty());
    }
}
