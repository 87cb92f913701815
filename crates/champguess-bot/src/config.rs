// Configuration loading and parsing (bot.toml, game.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use champguess_core::RoundSettings;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },

    #[error("{} is missing {missing}; restore it or remove the whole pair to reseed", dir.display())]
    IncompleteConfig { dir: PathBuf, missing: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway_port: u16,
    pub db_path: String,
    pub content: ContentConfig,
    pub game: GameConfig,
}

// ---------------------------------------------------------------------------
// bot.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct BotFile {
    gateway: GatewaySection,
    database: DatabaseSection,
    content: ContentConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct GatewaySection {
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

/// Where champion data comes from.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    pub base_url: String,
    /// A concrete patch such as "14.10.1", or "latest".
    pub version: String,
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    "en_US".to_string()
}

// ---------------------------------------------------------------------------
// game.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    pub round: RoundSection,
    pub trade: TradeSection,
    pub economy: EconomySection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoundSection {
    pub guild_cooldown_secs: u64,
    pub hint_delay_secs: u64,
    pub max_guess_tokens: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeSection {
    pub expiry_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EconomySection {
    pub daily_reset_hour: u32,
    pub leaderboard_size: usize,
}

impl GameConfig {
    pub fn round_settings(&self) -> RoundSettings {
        RoundSettings {
            guild_cooldown: Duration::from_secs(self.round.guild_cooldown_secs),
            hint_delay: Duration::from_secs(self.round.hint_delay_secs),
            max_guess_tokens: self.round.max_guess_tokens,
        }
    }

    pub fn trade_expiry(&self) -> Duration {
        Duration::from_secs(self.trade.expiry_secs)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/bot.toml` and `config/game.toml` relative to
/// `base_dir`. Does not copy defaults; see [`load_config`].
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let bot_path = config_dir.join("bot.toml");
    let bot_text = read_file(&bot_path)?;
    let bot: BotFile = toml::from_str(&bot_text).map_err(|e| ConfigError::ParseError {
        path: bot_path.clone(),
        source: e,
    })?;

    let game_path = config_dir.join("game.toml");
    let game_text = read_file(&game_path)?;
    let game: GameConfig = toml::from_str(&game_text).map_err(|e| ConfigError::ParseError {
        path: game_path.clone(),
        source: e,
    })?;

    let config = Config {
        gateway_port: bot.gateway.port,
        db_path: bot.database.path,
        content: bot.content,
        game,
    };

    validate(&config)?;

    Ok(config)
}

/// Shipped templates for the config pair, written on first run.
const DEFAULT_FILES: [(&str, &str); 2] = [
    ("bot.toml", include_str!("../defaults/bot.toml")),
    ("game.toml", include_str!("../defaults/game.toml")),
];

/// Seed `config/` with the shipped `bot.toml` and `game.toml` when neither
/// exists yet. Returns the files written.
///
/// A directory holding only one of the pair is rejected: the missing half
/// would otherwise come back with default values next to an edited file.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let config_dir = base_dir.join("config");

    let missing: Vec<&str> = DEFAULT_FILES
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| !config_dir.join(name).is_file())
        .collect();
    if missing.is_empty() {
        return Ok(Vec::new());
    }
    if missing.len() < DEFAULT_FILES.len() {
        return Err(ConfigError::IncompleteConfig {
            dir: config_dir,
            missing: missing.join(", "),
        });
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create {}: {e}", config_dir.display()),
    })?;

    let mut written = Vec::with_capacity(DEFAULT_FILES.len());
    for (name, template) in DEFAULT_FILES {
        let target = config_dir.join(name);
        std::fs::write(&target, template).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to write {}: {e}", target.display()),
        })?;
        written.push(target);
    }
    Ok(written)
}

/// Load config relative to the current working directory, seeding the
/// shipped pair on first run.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.db_path.trim().is_empty() {
        return Err(invalid("database.path", "must not be empty"));
    }
    if config.content.base_url.trim().is_empty() {
        return Err(invalid("content.base_url", "must not be empty"));
    }

    let hour = config.game.economy.daily_reset_hour;
    if hour > 23 {
        return Err(invalid(
            "economy.daily_reset_hour",
            format!("must be between 0 and 23, got {hour}"),
        ));
    }

    let positive: &[(&str, u64)] = &[
        ("trade.expiry_secs", config.game.trade.expiry_secs),
        (
            "economy.leaderboard_size",
            config.game.economy.leaderboard_size as u64,
        ),
        (
            "round.max_guess_tokens",
            config.game.round.max_guess_tokens as u64,
        ),
    ];
    for (name, val) in positive {
        if *val == 0 {
            return Err(invalid(name, "must be > 0"));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
