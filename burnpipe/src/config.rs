//! Engine configuration loaded from an INI file.
//!
//! ```ini
//! [engine]
//! poll_interval_ms = 500
//!
//! [session]
//! tmp_dir = /var/tmp
//!
//! [xfer]
//! buffer_size = 65536
//!
//! [logging]
//! level = info
//! file = /home/user/.local/state/burnpipe/burnpipe.log
//! ```
//!
//! Missing keys keep their defaults; a missing file is the default
//! configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use crate::error::{BurnError, EngineResult};
use crate::job::DEFAULT_POLL_INTERVAL;
use crate::xfer::DEFAULT_BUFFER_SIZE;

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub level: String,
    /// Also write logs to this file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Settings shared by the engine and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Time between two chain poll rounds.
    pub poll_interval: Duration,
    /// Root for temporary files and directories of a session.
    pub tmp_dir: PathBuf,
    /// Chunk size for transfer copies.
    pub copy_buffer_size: usize,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            tmp_dir: std::env::temp_dir(),
            copy_buffer_size: DEFAULT_BUFFER_SIZE,
            logging: LoggingConfig::default(),
        }
    }
}

/// Default location of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("burnpipe")
        .join("config.ini")
}

impl EngineConfig {
    /// Load from [`config_file_path`].
    pub fn load() -> EngineResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`; a missing file gives the defaults.
    pub fn load_from(path: &Path) -> EngineResult<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_ini_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(BurnError::Config(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn from_ini_str(text: &str) -> EngineResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| BurnError::Config(e.to_string()))?;
        let mut config = Self::default();

        if let Some(ms) = parse_key::<u64>(&ini, "engine", "poll_interval_ms")? {
            if ms == 0 {
                return Err(BurnError::Config(
                    "engine.poll_interval_ms must be greater than zero".into(),
                ));
            }
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Some(dir) = ini.get_from(Some("session"), "tmp_dir") {
            config.tmp_dir = PathBuf::from(dir);
        }

        if let Some(size) = parse_key::<usize>(&ini, "xfer", "buffer_size")? {
            if size == 0 {
                return Err(BurnError::Config(
                    "xfer.buffer_size must be greater than zero".into(),
                ));
            }
            config.copy_buffer_size = size;
        }

        if let Some(level) = ini.get_from(Some("logging"), "level") {
            if level.trim().is_empty() {
                return Err(BurnError::Config("logging.level must not be empty".into()));
            }
            config.logging.level = level.trim().to_string();
        }
        config.logging.file = ini
            .get_from(Some("logging"), "file")
            .filter(|f| !f.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    /// Render the configuration as INI text.
    pub fn to_ini(&self) -> String {
        let mut ini = Ini::new();
        ini.with_section(Some("engine")).set(
            "poll_interval_ms",
            self.poll_interval.as_millis().to_string(),
        );
        ini.with_section(Some("session"))
            .set("tmp_dir", self.tmp_dir.display().to_string());
        ini.with_section(Some("xfer"))
            .set("buffer_size", self.copy_buffer_size.to_string());
        let mut logging = ini.with_section(Some("logging"));
        logging.set("level", self.logging.level.as_str());
        if let Some(file) = &self.logging.file {
            logging.set("file", file.display().to_string());
        }

        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = ini.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Write the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BurnError::Config(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        fs::write(path, self.to_ini())
            .map_err(|e| BurnError::Config(format!("cannot write {}: {}", path.display(), e)))
    }
}

fn parse_key<T: FromStr>(ini: &Ini, section: &str, key: &str) -> EngineResult<Option<T>> {
    match ini.get_from(Some(section), key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            BurnError::Config(format!("{section}.{key}: invalid value '{raw}'"))
        }),
    }
}
