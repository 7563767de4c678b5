//! Server configuration.
//!
//! Every setting has a default. [`ServerConfig::from_env`] overrides them
//! from `SANGUO_*` environment variables and validates the result:
//!
//! | Variable | Setting |
//! |---|---|
//! | `SANGUO_BIND` | listen address |
//! | `SANGUO_MAX_ROOMS` | room ceiling |
//! | `SANGUO_MIN_PLAYERS` / `SANGUO_MAX_PLAYERS` | room size bounds |
//! | `SANGUO_ROUND_CEILING` | last round of a match |
//! | `SANGUO_ACTION_POINTS` | action points per round |
//! | `SANGUO_BOARD_WIDTH` / `SANGUO_BOARD_HEIGHT` | board size |
//! | `SANGUO_PREPARE_SECS` / `SANGUO_DEPLOY_SECS` / `SANGUO_TURN_SECS` | phase budgets |
//! | `SANGUO_MATCH_INTERVAL_MS` | matchmaking tick |
//! | `SANGUO_MATCH_JITTER_MS` | largest delay before the first matchmaking tick |
//! | `SANGUO_RANK_THRESHOLD` | matchmaking rank spread |
//! | `SANGUO_HEARTBEAT_SECS` | ping interval |
//! | `SANGUO_CATALOG` | path to a catalog JSON file |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sanguo_engine::{CatalogError, StaticCatalog};
use sanguo_room::{MAX_ROOM_SIZE, MIN_ROOM_SIZE, MatchmakingConfig, RoomSettings};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is not valid: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("cannot read catalog {path}: {source}")]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// How often the server pings an idle connection.
    pub heartbeat_interval: Duration,
    /// A connection silent for this long is dropped.
    pub idle_timeout: Duration,
    /// Time a new connection has to send `auth`.
    pub auth_timeout: Duration,
    pub rooms: RoomSettings,
    pub matchmaking: MatchmakingConfig,
    /// Catalog file. The built-in catalog is used when unset.
    pub catalog: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let heartbeat_interval = Duration::from_secs(30);
        Self {
            bind: "127.0.0.1:8080".to_owned(),
            heartbeat_interval,
            idle_timeout: heartbeat_interval * 3,
            auth_timeout: Duration::from_secs(10),
            rooms: RoomSettings::default(),
            matchmaking: MatchmakingConfig::default(),
            catalog: None,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each
    /// `SANGUO_*` variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let env = Env(&lookup);

        if let Some(bind) = lookup("SANGUO_BIND") {
            config.bind = bind;
        }
        let rooms = &mut config.rooms;
        env.set("SANGUO_MAX_ROOMS", &mut rooms.max_rooms)?;
        env.set("SANGUO_MIN_PLAYERS", &mut rooms.min_players)?;
        env.set("SANGUO_MAX_PLAYERS", &mut rooms.max_players)?;
        env.set("SANGUO_ROUND_CEILING", &mut rooms.rules.round_ceiling)?;
        env.set("SANGUO_ACTION_POINTS", &mut rooms.rules.action_points)?;
        env.set("SANGUO_BOARD_WIDTH", &mut rooms.rules.board_width)?;
        env.set("SANGUO_BOARD_HEIGHT", &mut rooms.rules.board_height)?;
        env.set_secs("SANGUO_PREPARE_SECS", &mut rooms.prepare_budget)?;
        env.set_secs("SANGUO_DEPLOY_SECS", &mut rooms.deploy_budget)?;
        env.set_secs("SANGUO_TURN_SECS", &mut rooms.turn_budget)?;

        let matchmaking = &mut config.matchmaking;
        if let Some(ms) = env.parse::<u64>("SANGUO_MATCH_INTERVAL_MS")? {
            matchmaking.interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env.parse::<u64>("SANGUO_MATCH_JITTER_MS")? {
            matchmaking.jitter = Duration::from_millis(ms);
        }
        env.set("SANGUO_RANK_THRESHOLD", &mut matchmaking.rank_threshold)?;

        if env.set_secs("SANGUO_HEARTBEAT_SECS", &mut config.heartbeat_interval)? {
            config.idle_timeout = config.heartbeat_interval * 3;
        }
        if let Some(path) = lookup("SANGUO_CATALOG") {
            config.catalog = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rooms = &self.rooms;
        if rooms.max_rooms == 0 {
            return Err(ConfigError::Invalid("max_rooms must be at least 1".into()));
        }
        let sizes = MIN_ROOM_SIZE..=MAX_ROOM_SIZE;
        if !sizes.contains(&rooms.min_players) || !sizes.contains(&rooms.max_players) {
            return Err(ConfigError::Invalid(format!(
                "room sizes must lie in {MIN_ROOM_SIZE}..={MAX_ROOM_SIZE}, got {}..={}",
                rooms.min_players, rooms.max_players
            )));
        }
        if rooms.min_players > rooms.max_players {
            return Err(ConfigError::Invalid(format!(
                "min_players {} exceeds max_players {}",
                rooms.min_players, rooms.max_players
            )));
        }
        if rooms.rules.round_ceiling == 0 || rooms.rules.action_points == 0 {
            return Err(ConfigError::Invalid(
                "round_ceiling and action_points must be positive".into(),
            ));
        }
        if rooms.rules.board_width < 1 || rooms.rules.board_height < 3 {
            return Err(ConfigError::Invalid(format!(
                "board {}x{} is too small",
                rooms.rules.board_width, rooms.rules.board_height
            )));
        }
        let budgets = [rooms.prepare_budget, rooms.deploy_budget, rooms.turn_budget];
        if budgets.contains(&Duration::ZERO) {
            return Err(ConfigError::Invalid("phase budgets must be positive".into()));
        }
        if self.matchmaking.interval.is_zero() || self.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "matchmaking and heartbeat intervals must be positive".into(),
            ));
        }
        if self.idle_timeout <= self.heartbeat_interval {
            return Err(ConfigError::Invalid(
                "idle_timeout must be longer than heartbeat_interval".into(),
            ));
        }
        Ok(())
    }

    /// Loads the configured catalog file, or the built-in catalog.
    pub fn load_catalog(&self) -> Result<StaticCatalog, ConfigError> {
        let Some(path) = &self.catalog else {
            return Ok(StaticCatalog::builtin()?);
        };
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::CatalogRead {
            path: path.clone(),
            source,
        })?;
        Ok(StaticCatalog::from_json(&json)?)
    }
}

/// Typed access to one configuration source.
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(value) = (self.0)(var) else {
            return Ok(None);
        };
        match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(err) => Err(ConfigError::InvalidValue {
                var,
                reason: err.to_string(),
                value,
            }),
        }
    }

    fn set<T>(&self, var: &'static str, slot: &mut T) -> Result<bool, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.parse(var)? {
            Some(value) => {
                *slot = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_secs(&self, var: &'static str, slot: &mut Duration) -> Result<bool, ConfigError> {
        match self.parse::<u64>(var)? {
            Some(secs) => {
                *slot = Duration::from_secs(secs);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ServerConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind, "127.0.0.1:8080");
        assert_eq!(config.rooms.max_rooms, 1000);
        assert_eq!(config.matchmaking.interval, Duration::from_secs(2));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert!(config.catalog.is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let config = load(&[
            ("SANGUO_BIND", "0.0.0.0:9000"),
            ("SANGUO_MAX_ROOMS", "12"),
            ("SANGUO_ROUND_CEILING", "5"),
            ("SANGUO_TURN_SECS", "10"),
            ("SANGUO_MATCH_INTERVAL_MS", "500"),
            ("SANGUO_MATCH_JITTER_MS", "0"),
            ("SANGUO_RANK_THRESHOLD", " 250 "),
            ("SANGUO_HEARTBEAT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.rooms.max_rooms, 12);
        assert_eq!(config.rooms.rules.round_ceiling, 5);
        assert_eq!(config.rooms.turn_budget, Duration::from_secs(10));
        assert_eq!(config.matchmaking.interval, Duration::from_millis(500));
        assert_eq!(config.matchmaking.jitter, Duration::ZERO);
        assert_eq!(config.matchmaking.rank_threshold, 250);
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_unparsable_value_names_the_variable() {
        let err = load(&[("SANGUO_MAX_ROOMS", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "SANGUO_MAX_ROOMS", .. }));
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        assert!(load(&[("SANGUO_MAX_PLAYERS", "7")]).is_err());
        assert!(load(&[("SANGUO_MIN_PLAYERS", "5"), ("SANGUO_MAX_PLAYERS", "3")]).is_err());
        assert!(load(&[("SANGUO_MAX_ROOMS", "0")]).is_err());
        assert!(load(&[("SANGUO_DEPLOY_SECS", "0")]).is_err());
        assert!(load(&[("SANGUO_BOARD_HEIGHT", "2")]).is_err());
    }

    #[test]
    fn test_builtin_catalog_loads_without_a_path() {
        let catalog = ServerConfig::default().load_catalog().unwrap();
        assert!(!catalog.generals.is_empty());
    }

    #[test]
    fn test_missing_catalog_file_is_reported() {
        let config = load(&[("SANGUO_CATALOG", "/definitely/not/here.json")]).unwrap();
        assert!(matches!(
            config.load_catalog(),
            Err(ConfigError::CatalogRead { .. })
        ));
    }
}
