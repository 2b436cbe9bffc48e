//! Application-level configuration loading: roster, course, pricing and
//! leaderboard settings.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    services::sync_service::SyncSettings,
    state::{
        cost::{CostPolicy, CostPolicyKind},
        league::League,
        scoring::{LeaderboardMetric, ParTable},
    },
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "FANTASY_GOLF_CONFIG_PATH";
/// Name of the shared league document.
const DEFAULT_DOCUMENT_KEY: &str = "leagueState";

const DEFAULT_TEAMS: [&str; 12] = [
    "AirPumpBulges LLC",
    "Salt",
    "Let me She/Them Titties",
    "Dogwata Jobies",
    "3 Holes of Contact",
    "Ya Love to see it",
    "Team DadStrength",
    "John Buck > Joe Buck",
    "Handful of TDs",
    "Cash Money $100 Bills",
    "Risky Glizzness",
    "Nate and Jake 4ever",
];

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    document_key: String,
    teams: Vec<String>,
    pars: ParTable,
    cost_policy: CostPolicyKind,
    leaderboard: LeaderboardMetric,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        document_key = %app_config.document_key,
                        cost_policy = ?app_config.cost_policy,
                        leaderboard = ?app_config.leaderboard,
                        "loaded league configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Name of the shared document every client reads and writes.
    pub fn document_key(&self) -> &str {
        &self.document_key
    }

    /// Team names used when the shared document has to be created.
    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    /// Par of every hole.
    pub fn pars(&self) -> &ParTable {
        &self.pars
    }

    /// Cost curve applied to adjustments.
    pub fn cost_policy(&self) -> CostPolicy {
        self.cost_policy.into()
    }

    /// Metric ranking the leaderboard.
    pub fn leaderboard(&self) -> LeaderboardMetric {
        self.leaderboard
    }

    /// Settings handed to the sync controller.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings::new(
            self.document_key.clone(),
            self.teams.clone(),
            self.cost_policy(),
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            document_key: DEFAULT_DOCUMENT_KEY.to_owned(),
            teams: DEFAULT_TEAMS.iter().map(|name| (*name).to_owned()).collect(),
            pars: ParTable::default(),
            cost_policy: CostPolicyKind::default(),
            leaderboard: LeaderboardMetric::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    document_key: Option<String>,
    teams: Option<Vec<String>>,
    pars: Option<Vec<u32>>,
    cost_policy: Option<CostPolicyKind>,
    leaderboard: Option<LeaderboardMetric>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();

        let document_key = match value.document_key {
            Some(key) if !key.trim().is_empty() => key,
            Some(_) => {
                warn!("empty document_key in config; using the default");
                defaults.document_key
            }
            None => defaults.document_key,
        };

        let teams = match value.teams {
            Some(teams) => match League::with_roster(teams.iter().cloned()) {
                Ok(_) if teams.iter().all(|name| !name.trim().is_empty()) => teams,
                Ok(_) => {
                    warn!("blank team name in config; using the default roster");
                    defaults.teams
                }
                Err(err) => {
                    warn!(error = %err, "invalid roster in config; using the default roster");
                    defaults.teams
                }
            },
            None => defaults.teams,
        };

        let pars = match value.pars {
            Some(pars) if pars.contains(&0) => {
                warn!("par of zero in config; using the default par table");
                defaults.pars
            }
            Some(pars) => ParTable::try_from(pars).unwrap_or_else(|pars| {
                warn!(
                    count = pars.len(),
                    "par table must list every hole; using the default par table"
                );
                defaults.pars
            }),
            None => defaults.pars,
        };

        Self {
            document_key,
            teams,
            pars,
            cost_policy: value.cost_policy.unwrap_or(defaults.cost_policy),
            leaderboard: value.leaderboard.unwrap_or(defaults.leaderboard),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> AppConfig {
        serde_json::from_str::<RawConfig>(json).unwrap().into()
    }

    #[test]
    fn empty_file_keeps_defaults() {
        let config = parse("{}");
        assert_eq!(config.document_key(), "leagueState");
        assert_eq!(config.teams().len(), 12);
        assert_eq!(config.teams()[1], "Salt");
        assert_eq!(config.pars(), &ParTable::default());
        assert_eq!(config.cost_policy(), CostPolicy::STEEP);
        assert_eq!(config.leaderboard(), LeaderboardMetric::ParRelative);
    }

    #[test]
    fn valid_fields_override_defaults() {
        let teams = (1..=12).map(|n| format!("\"T{n}\"")).collect::<Vec<_>>();
        let config = parse(&format!(
            r#"{{
                "document_key": "league2025",
                "teams": [{}],
                "pars": [3,3,3,3,3,3,3,3,3,3,3,3,3,3,3,3,3,5],
                "cost_policy": "tapered",
                "leaderboard": "total_strokes"
            }}"#,
            teams.join(",")
        ));

        assert_eq!(config.document_key(), "league2025");
        assert_eq!(config.teams()[11], "T12");
        assert_eq!(config.pars().par(17), Some(5));
        assert_eq!(config.cost_policy(), CostPolicy::TAPERED);
        assert_eq!(config.leaderboard(), LeaderboardMetric::TotalStrokes);
    }

    #[test]
    fn invalid_fields_fall_back_individually() {
        let config = parse(
            r#"{
                "document_key": "  ",
                "teams": ["only", "two"],
                "pars": [4, 4, 4],
                "cost_policy": "tapered"
            }"#,
        );

        assert_eq!(config.document_key(), "leagueState");
        assert_eq!(config.teams().len(), 12);
        assert_eq!(config.pars(), &ParTable::default());
        assert_eq!(config.cost_policy(), CostPolicy::TAPERED);
    }

    #[test]
    fn duplicate_team_names_are_rejected() {
        let mut teams = vec!["\"Same\"".to_string(); 2];
        teams.extend((3..=12).map(|n| format!("\"T{n}\"")));
        let config = parse(&format!(r#"{{"teams": [{}]}}"#, teams.join(",")));
        assert_eq!(config.teams()[0], "AirPumpBulges LLC");
    }

    #[test]
    fn sync_settings_follow_config() {
        let settings = parse(r#"{"cost_policy": "tapered"}"#).sync_settings();
        assert_eq!(settings.document_key, "leagueState");
        assert_eq!(settings.roster.len(), 12);
        assert_eq!(settings.policy, CostPolicy::TAPERED);
    }
}
