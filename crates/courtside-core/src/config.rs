// Configuration loading and parsing (courtside.toml, credentials.toml).

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("no config/ or defaults/ directory under {}", .base_dir.display())]
    NoConfigSource { base_dir: PathBuf },

    #[error("cannot seed {path} from defaults: {source}")]
    Seed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory relative paths (database, datasets) are resolved against.
    pub base_dir: PathBuf,
    pub database: DatabaseConfig,
    pub season_load: SeasonLoadConfig,
    pub boxscore: BoxScoreConfig,
    pub feed: FeedConfig,
    pub retry: RetryConfig,
    pub credentials: CredentialsConfig,
}

impl Config {
    /// Resolve a configured path against the base directory. Absolute paths
    /// and `:memory:` are returned unchanged.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if path == ":memory:" || p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    pub fn database_path(&self) -> String {
        self.resolve_path(&self.database.path)
            .to_string_lossy()
            .into_owned()
    }
}

// ---------------------------------------------------------------------------
// courtside.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the whole courtside.toml file.
#[derive(Debug, Clone, Deserialize)]
struct CourtsideFile {
    database: DatabaseConfig,
    season_load: SeasonLoadConfig,
    boxscore: BoxScoreConfig,
    feed: FeedConfig,
    retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeasonLoadConfig {
    /// Players with `gp <= min_games` are filtered out.
    pub min_games: f64,
    /// Players with `min <= min_minutes` are filtered out.
    pub min_minutes: f64,
    /// Seasons to ensure even when no dataset names them.
    #[serde(default)]
    pub seasons: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Season-and-kind token, e.g. `24_25_teams`.
    pub key: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoxScoreConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    pub locale: String,
    pub timeout_secs: u64,
    pub page_size: u32,
    pub request_delay_ms: u64,
    /// Competition display name -> feed URN.
    #[serde(default)]
    pub competitions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub feed_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Read `config/courtside.toml` plus the optional `config/credentials.toml`
/// under `base_dir` and validate the result. Nothing is seeded here.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let main_path = config_dir.join("courtside.toml");
    let main_text = read_file(&main_path)?;
    let file: CourtsideFile = toml::from_str(&main_text).map_err(|e| ConfigError::ParseError {
        path: main_path.clone(),
        source: e,
    })?;

    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        base_dir: base_dir.to_path_buf(),
        database: file.database,
        season_load: file.season_load,
        boxscore: file.boxscore,
        feed: file.feed,
        retry: file.retry,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Populate `config/` from the shipped `defaults/`, leaving any file already
/// in `config/` untouched. Returns the files written.
pub fn seed_config_dir(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        return if config_dir.is_dir() {
            Ok(Vec::new())
        } else {
            Err(ConfigError::NoConfigSource {
                base_dir: base_dir.to_path_buf(),
            })
        };
    }

    fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Seed {
        path: config_dir.clone(),
        source,
    })?;

    let mut written = Vec::new();
    for from in seedable_defaults(&defaults_dir)? {
        let Some(name) = from.file_name() else {
            continue;
        };
        let to = config_dir.join(name);
        if seed_file(&from, &to)? {
            written.push(to);
        }
    }
    Ok(written)
}

/// Regular files under `defaults/`, minus `*.example` templates.
fn seedable_defaults(defaults_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let seed_err = |source| ConfigError::Seed {
        path: defaults_dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(defaults_dir).map_err(seed_err)? {
        let path = entry.map_err(seed_err)?.path();
        let template = path.extension().is_some_and(|ext| ext == "example");
        if path.is_file() && !template {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Copy `from` to `to` only if `to` does not exist yet.
fn seed_file(from: &Path, to: &Path) -> Result<bool, ConfigError> {
    let mut dest = match OpenOptions::new().write(true).create_new(true).open(to) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(source) => {
            return Err(ConfigError::Seed {
                path: to.to_path_buf(),
                source,
            })
        }
    };
    let content = fs::read(from).map_err(|source| ConfigError::Seed {
        path: from.to_path_buf(),
        source,
    })?;
    dest.write_all(&content).map_err(|source| ConfigError::Seed {
        path: to.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// Pick the base directory: the current directory when it holds `config/`
/// or `defaults/`, otherwise the platform config directory.
pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir().map_err(|source| ConfigError::Read {
        path: PathBuf::from("."),
        source,
    })?;
    if cwd.join("config").exists() || cwd.join("defaults").exists() {
        return Ok(cwd);
    }
    match directories::ProjectDirs::from("", "", "courtside") {
        Some(dirs) => Ok(dirs.config_dir().to_path_buf()),
        None => Ok(cwd),
    }
}

/// Seed `config/` from `defaults/` where needed, then load.
pub fn load_config(base_dir: &Path) -> Result<Config, ConfigError> {
    seed_config_dir(base_dir)?;
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.database.path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    let load = &config.season_load;
    let thresholds: &[(&str, f64)] = &[
        ("season_load.min_games", load.min_games),
        ("season_load.min_minutes", load.min_minutes),
    ];
    for (name, val) in thresholds {
        if !val.is_finite() || *val < 0.0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: format!("must be a non-negative number, got {val}"),
            });
        }
    }

    for (i, dataset) in load.datasets.iter().enumerate() {
        if dataset.key.trim().is_empty() || dataset.path.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: format!("season_load.datasets[{i}]"),
                message: "key and path must not be empty".into(),
            });
        }
    }

    let positive: &[(&str, u64)] = &[
        ("boxscore.timeout_secs", config.boxscore.timeout_secs),
        ("feed.timeout_secs", config.feed.timeout_secs),
        ("feed.page_size", u64::from(config.feed.page_size)),
        ("retry.max_attempts", u64::from(config.retry.max_attempts)),
    ];
    for (name, val) in positive {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Workspace root, where `defaults/` lives.
    fn project_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
    }

    /// Fresh temp dir with `config/` populated from the shipped defaults.
    fn temp_base(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::copy(
            project_root().join("defaults/courtside.toml"),
            tmp.join("config/courtside.toml"),
        )
        .unwrap();
        tmp
    }

    fn rewrite(base: &Path, from: &str, to: &str) {
        let path = base.join("config/courtside.toml");
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains(from), "fixture should contain {from:?}");
        fs::write(&path, text.replace(from, to)).unwrap();
    }

    #[test]
    fn load_shipped_defaults() {
        let tmp = temp_base("courtside_config_defaults");
        let config = load_config_from(&tmp).expect("defaults should load");

        assert_eq!(config.database.path, "courtside.db");
        assert!((config.season_load.min_games - 3.0).abs() < f64::EPSILON);
        assert!((config.season_load.min_minutes - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.season_load.seasons, vec!["2023-24", "2024-25"]);
        assert_eq!(config.season_load.datasets.len(), 4);
        assert_eq!(config.season_load.datasets[0].key, "24_25_teams");
        assert_eq!(config.feed.page_size, 200);
        assert_eq!(
            config.feed.competitions.get("Euroleague").map(String::as_str),
            Some("sr:competition:138")
        );
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 30_000);
        assert!(config.credentials.feed_api_key.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_toml_with_api_key() {
        let tmp = temp_base("courtside_config_creds");
        fs::write(
            tmp.join("config/credentials.toml"),
            "feed_api_key = \"test-key\"\n",
        )
        .unwrap();

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.credentials.feed_api_key.as_deref(), Some("test-key"));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn resolve_path_is_relative_to_base() {
        let tmp = temp_base("courtside_config_resolve");
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.resolve_path("data/x.csv"), tmp.join("data/x.csv"));
        assert_eq!(config.resolve_path(":memory:"), PathBuf::from(":memory:"));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_negative_min_games() {
        let tmp = temp_base("courtside_config_min_games");
        rewrite(&tmp, "min_games = 3", "min_games = -1");

        let err = load_config_from(&tmp).unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "season_load.min_games")
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_retry_attempts() {
        let tmp = temp_base("courtside_config_retry");
        rewrite(&tmp, "max_attempts = 5", "max_attempts = 0");

        let err = load_config_from(&tmp).unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { ref field, .. } if field == "retry.max_attempts")
        );
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = temp_base("courtside_config_invalid");
        fs::write(tmp.join("config/courtside.toml"), "[database\npath = ").unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_main_file_is_read_error() {
        let tmp = std::env::temp_dir().join("courtside_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::Read { path, .. } => assert!(path.ends_with("courtside.toml")),
            other => panic!("expected Read, got {other:?}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn seeding_copies_missing_and_skips_examples() {
        let tmp = std::env::temp_dir().join("courtside_config_ensure");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults/courtside.toml"), "x = 1\n").unwrap();
        fs::write(tmp.join("defaults/credentials.toml.example"), "y = 2\n").unwrap();
        fs::create_dir_all(tmp.join("config")).unwrap();

        let copied = seed_config_dir(&tmp).unwrap();
        assert_eq!(copied, vec![tmp.join("config/courtside.toml")]);
        assert!(!tmp.join("config/credentials.toml.example").exists());

        // Second run leaves the existing copy alone.
        fs::write(tmp.join("config/courtside.toml"), "x = 9\n").unwrap();
        assert!(seed_config_dir(&tmp).unwrap().is_empty());
        assert_eq!(
            fs::read_to_string(tmp.join("config/courtside.toml")).unwrap(),
            "x = 9\n"
        );
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn seeding_needs_config_or_defaults() {
        let tmp = std::env::temp_dir().join("courtside_config_empty");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = seed_config_dir(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::NoConfigSource { .. }));

        // A config/ directory alone is enough.
        fs::create_dir_all(tmp.join("config")).unwrap();
        assert!(seed_config_dir(&tmp).unwrap().is_empty());
        let _ = fs::remove_dir_all(&tmp);
    }
}
