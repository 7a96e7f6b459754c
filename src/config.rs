use lazy_static::lazy_static;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::new());
}

/// Process-wide playout tuning, used as the defaults of every new source.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// How far ahead of the last emitted sample the scheduler may read.
    pub read_ahead: Duration,
    /// Consecutive failed reads tolerated before the worker backs off.
    pub max_read_failures: u32,
    /// First backoff after `max_read_failures` is reached.
    pub failure_backoff: Duration,
    /// Upper bound of the doubling backoff.
    pub max_failure_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_ahead: Duration::from_millis(2000),
            max_read_failures: 32,
            failure_backoff: Duration::from_millis(50),
            max_failure_backoff: Duration::from_millis(2000),
        }
    }
}

impl Config {
    fn new() -> Self {
        let mut config = Config::default();

        // Environment variables first
        for (key, var) in ENV_KEYS {
            if let Ok(value) = env::var(var) {
                config.apply(key, &value);
            }
        }

        // Then the first config file found
        let config_paths = ["./playout.toml", "./playout_config.toml"];
        for path in &config_paths {
            if let Ok(mut file) = File::open(path) {
                let mut content = String::new();
                if file.read_to_string(&mut content).is_ok() {
                    config.apply_file(&content);
                    break;
                }
            }
        }

        config
    }

    /// Applies `key = value` lines; comments, blanks and unknown keys are skipped.
    fn apply_file(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                self.apply(key.trim(), value);
            }
        }
    }

    fn apply(&mut self, key: &str, value: &str) {
        let Ok(number) = value.trim().parse::<u64>() else {
            return;
        };
        match key {
            "read_ahead_ms" if number > 0 => self.read_ahead = Duration::from_millis(number),
            "max_read_failures" if number > 0 => {
                self.max_read_failures = number.min(u32::MAX as u64) as u32
            }
            "failure_backoff_ms" => self.failure_backoff = Duration::from_millis(number),
            "max_failure_backoff_ms" => self.max_failure_backoff = Duration::from_millis(number),
            _ => {}
        }
    }

    pub fn reload() {
        let new_config = Config::new();
        if let Ok(mut config) = CONFIG.write() {
            *config = new_config;
        }
    }
}

const ENV_KEYS: [(&str, &str); 4] = [
    ("read_ahead_ms", "PLAYOUT_READ_AHEAD_MS"),
    ("max_read_failures", "PLAYOUT_MAX_READ_FAILURES"),
    ("failure_backoff_ms", "PLAYOUT_FAILURE_BACKOFF_MS"),
    ("max_failure_backoff_ms", "PLAYOUT_MAX_FAILURE_BACKOFF_MS"),
];

/// Returns the current configuration
pub fn get() -> Config {
    CONFIG
        .read()
        .map(|config| config.clone())
        .unwrap_or_default()
}

/// Re-reads environment and config file
pub fn reload() {
    Config::reload()
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# Playout Configuration
# Values shown are the built-in defaults.

# Read-ahead window in milliseconds
read_ahead_ms = 2000

# Consecutive failed reads before the worker backs off
max_read_failures = 32

# Backoff after repeated failures, doubling up to the maximum
failure_backoff_ms = 50
max_failure_backoff_ms = 2000
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_file() {
        let mut config = Config::default();
        config.apply_file(
            r#"
# comment
read_ahead_ms = 500
max_read_failures = "4"
failure_backoff_ms = 0
unknown = 12
max_failure_backoff_ms = nope
"#,
        );

        assert_eq!(config.read_ahead, Duration::from_millis(500));
        assert_eq!(config.max_read_failures, 4);
        assert_eq!(config.failure_backoff, Duration::ZERO);
        assert_eq!(config.max_failure_backoff, Duration::from_millis(2000));
    }

    #[test]
    fn test_zero_window_is_ignored() {
        let mut config = Config::default();
        config.apply("read_ahead_ms", "0");
        config.apply("max_read_failures", "0");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let path = std::env::temp_dir().join(format!("playout_template_{}.toml", std::process::id()));
        let _ = std::fs::remove_file(&path);
        create_default_config_template(&path).unwrap();

        let mut config = Config::default();
        config.read_ahead = Duration::from_secs(9);
        config.apply_file(&std::fs::read_to_string(&path).unwrap());
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config, Config::default());
    }
}
