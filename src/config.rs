use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_data_path")]
    pub data_path: String,
    /// Debounce window for coalescing dataset writes.
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            save_debounce_ms: default_save_debounce_ms(),
        }
    }
}

fn default_data_path() -> String {
    "data.json".to_string()
}
fn default_save_debounce_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Base heartbeat tick; individual jobs run on their own intervals.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_reminder_sweep_secs")]
    pub reminder_sweep_secs: u64,
    #[serde(default = "default_idle_check_secs")]
    pub idle_check_secs: u64,
    #[serde(default = "default_curfew_check_secs")]
    pub curfew_check_secs: u64,
    /// Minutes of silence before a channel counts as idle.
    #[serde(default = "default_quiet_after_mins")]
    pub quiet_after_mins: u64,
    /// Minimum minutes between idle nudges in the same guild.
    #[serde(default = "default_nudge_cooldown_mins")]
    pub nudge_cooldown_mins: u64,
    /// Minimum minutes between calm-down responses per channel.
    #[serde(default = "default_calm_cooldown_mins")]
    pub calm_cooldown_mins: u64,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            reminder_sweep_secs: default_reminder_sweep_secs(),
            idle_check_secs: default_idle_check_secs(),
            curfew_check_secs: default_curfew_check_secs(),
            quiet_after_mins: default_quiet_after_mins(),
            nudge_cooldown_mins: default_nudge_cooldown_mins(),
            calm_cooldown_mins: default_calm_cooldown_mins(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

fn default_tick_interval_secs() -> u64 {
    5
}
fn default_reminder_sweep_secs() -> u64 {
    30
}
fn default_idle_check_secs() -> u64 {
    300
}
fn default_curfew_check_secs() -> u64 {
    300
}
fn default_quiet_after_mins() -> u64 {
    30
}
fn default_nudge_cooldown_mins() -> u64 {
    30
}
fn default_calm_cooldown_mins() -> u64 {
    10
}
fn default_max_concurrent_jobs() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct RolesConfig {
    /// Role name granting privileged commands.
    #[serde(default = "default_role_head")]
    pub head: String,
    /// Role mentioned by the curfew notice.
    #[serde(default = "default_role_kids")]
    pub kids: String,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self { head: default_role_head(), kids: default_role_kids() }
    }
}

fn default_role_head() -> String {
    "Head of Household".to_string()
}
fn default_role_kids() -> String {
    "Kids".to_string()
}

impl AppConfig {
    /// Load `config.toml`, falling back to defaults when absent, then apply
    /// environment overrides (`ROLE_HEAD`, `ROLE_KIDS`, `DATA_PATH`).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config: AppConfig = if path.exists() {
            toml::from_str(&std::fs::read_to_string(path)?)?
        } else {
            AppConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ROLE_HEAD") {
            self.roles.head = v;
        }
        if let Ok(v) = std::env::var("ROLE_KIDS") {
            self.roles.kids = v;
        }
        if let Ok(v) = std::env::var("DATA_PATH") {
            self.state.data_path = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_intervals() {
        let config = AppConfig::default();
        assert_eq!(config.state.data_path, "data.json");
        assert_eq!(config.state.save_debounce_ms, 500);
        assert_eq!(config.scheduler.reminder_sweep_secs, 30);
        assert_eq!(config.scheduler.idle_check_secs, 300);
        assert_eq!(config.scheduler.curfew_check_secs, 300);
        assert_eq!(config.roles.head, "Head of Household");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [state]
            data_path = "household.json"

            [roles]
            head = "Butler"
            "#,
        )
        .expect("parse");
        assert_eq!(config.state.data_path, "household.json");
        assert_eq!(config.state.save_debounce_ms, 500);
        assert_eq!(config.roles.head, "Butler");
        assert_eq!(config.roles.kids, "Kids");
    }
}
