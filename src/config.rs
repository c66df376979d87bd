//! Process-wide tunables for buffering and format probing.
//!
//! Values start from the built-in defaults, are overridden by environment
//! variables and finally by `key = value` lines in `./demuxio.toml` or
//! `./demuxio_config.toml`. A [`Context`](crate::Context) takes a snapshot
//! when it is created, so reloading never affects open sessions.

use lazy_static::lazy_static;
use log::warn;
use parking_lot::RwLock;
use std::env;
use std::fs;
use std::path::Path;

/// Read-ahead window used when a protocol reports no maximum packet size.
pub const IO_BUFFER_SIZE: usize = 32768;

/// First probe sample size.
pub const PROBE_BUF_MIN: usize = 2048;

/// Largest probe sample size; probing gives up once the sample would exceed it.
pub const PROBE_BUF_MAX: usize = 131072;

/// Upper bound accepted for any probe sample size.
pub const PROBE_BUF_LIMIT: usize = 1 << 26;

const CONFIG_PATHS: [&str; 2] = ["./demuxio.toml", "./demuxio_config.toml"];

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::load());
}

/// Buffering and probing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Default cursor capacity in bytes
    pub io_buffer_size: usize,
    /// Initial probe sample size in bytes
    pub probe_buf_min: usize,
    /// Probe sample cap in bytes
    pub probe_buf_max: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io_buffer_size: IO_BUFFER_SIZE,
            probe_buf_min: PROBE_BUF_MIN,
            probe_buf_max: PROBE_BUF_MAX,
        }
    }
}

impl Config {
    /// Builds a configuration from defaults, environment and config file.
    pub fn load() -> Self {
        let mut config = Config::default();

        for (var, key) in [
            ("DEMUXIO_IO_BUFFER_SIZE", "io_buffer_size"),
            ("DEMUXIO_PROBE_BUF_MIN", "probe_buf_min"),
            ("DEMUXIO_PROBE_BUF_MAX", "probe_buf_max"),
        ] {
            if let Ok(value) = env::var(var) {
                config.apply(key, &value);
            }
        }

        for path in &CONFIG_PATHS {
            if let Ok(content) = fs::read_to_string(path) {
                config.apply_str(&content);
            }
        }

        config.sanitize();
        config
    }

    /// Applies every `key = value` line of a config file body.
    pub fn apply_str(&mut self, content: &str) {
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
        let parsed = match value.trim().parse::<usize>() {
            Ok(v) if v > 0 => v,
            _ => {
                warn!("ignoring invalid value {:?} for {}", value, key);
                return;
            }
        };
        match key {
            "io_buffer_size" => self.io_buffer_size = parsed,
            "probe_buf_min" => self.probe_buf_min = parsed,
            "probe_buf_max" => self.probe_buf_max = parsed,
            _ => warn!("ignoring unknown config key {}", key),
        }
    }

    pub(crate) fn sanitize(&mut self) {
        if self.io_buffer_size == 0 {
            self.io_buffer_size = IO_BUFFER_SIZE;
        }
        if self.probe_buf_max > PROBE_BUF_LIMIT {
            warn!(
                "probe_buf_max {} above {}, clamping",
                self.probe_buf_max, PROBE_BUF_LIMIT
            );
            self.probe_buf_max = PROBE_BUF_LIMIT;
        }
        if self.probe_buf_min == 0 || self.probe_buf_min > self.probe_buf_max {
            warn!(
                "probe_buf_min {} exceeds probe_buf_max {}, using defaults",
                self.probe_buf_min, self.probe_buf_max
            );
            self.probe_buf_min = PROBE_BUF_MIN;
            self.probe_buf_max = PROBE_BUF_MAX;
        }
    }

    /// Re-reads the process-wide configuration.
    pub fn reload() {
        *CONFIG.write() = Config::load();
    }
}

/// Returns a copy of the process-wide configuration.
pub fn get() -> Config {
    CONFIG.read().clone()
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = format!(
            r#"# DEMUXIO Configuration
# Remove the leading '#' to override a value.

# io_buffer_size = {}
# probe_buf_min = {}
# probe_buf_max = {}
"#,
            IO_BUFFER_SIZE, PROBE_BUF_MIN, PROBE_BUF_MAX
        );
        fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_str_overrides_known_keys() {
        let mut config = Config::default();
        config.apply_str(
            "# comment\nio_buffer_size = 4096\nprobe_buf_min = \"1024\"\nbogus = 1\nprobe_buf_max = zero\n",
        );
        assert_eq!(
            config,
            Config {
                io_buffer_size: 4096,
                probe_buf_min: 1024,
                probe_buf_max: PROBE_BUF_MAX,
            }
        );
    }

    #[test]
    fn test_sanitize_rejects_inverted_bounds() {
        let mut config = Config {
            io_buffer_size: 1,
            probe_buf_min: 4096,
            probe_buf_max: 16,
        };
        config.sanitize();
        assert_eq!(config.probe_buf_min, PROBE_BUF_MIN);
        assert_eq!(config.probe_buf_max, PROBE_BUF_MAX);
    }

    #[test]
    fn test_sanitize_clamps_probe_cap() {
        let mut config = Config::default();
        config.apply("probe_buf_max", &usize::MAX.to_string());
        assert_eq!(config.probe_buf_max, usize::MAX);
        config.sanitize();
        assert_eq!(config.probe_buf_max, PROBE_BUF_LIMIT);
        assert_eq!(config.probe_buf_min, PROBE_BUF_MIN);

        let mut config = Config {
            io_buffer_size: 0,
            probe_buf_min: 0,
            probe_buf_max: 64,
        };
        config.sanitize();
        assert_eq!(config.io_buffer_size, IO_BUFFER_SIZE);
        assert_eq!(config.probe_buf_min, PROBE_BUF_MIN);
    }

    #[test]
    fn test_template_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demuxio.toml");
        create_default_config_template(&path).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        assert!(first.contains("probe_buf_max"));

        fs::write(&path, "io_buffer_size = 7\n").unwrap();
        create_default_config_template(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "io_buffer_size = 7\n");
    }
}
