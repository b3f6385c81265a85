//! Simulation configuration.
//!
//! Defaults suit a 60 Hz server. A JSON file may override any subset of
//! fields; `BOTFORGE_*` environment variables override the file.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use botforge_compile::SchedulerConfig;
use botforge_core::TechHash;
use botforge_vm::{EngineConfig, QueueCapacities};

use crate::error::SimError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Simulation ticks per second.
    pub tick_hz: u32,

    /// Distance a drive covers per tick at full throttle.
    pub drive_speed: f32,
    /// Maximum heading change per tick, degrees.
    pub drive_turn_rate: f32,

    /// Maximum turret rotation per tick, degrees.
    pub turret_turn_rate: f32,
    pub turret_cooldown_ticks: u32,
    /// Distance a projectile covers per tick.
    pub projectile_speed: f32,
    pub projectile_lifetime_ticks: u32,
    pub projectile_damage: i32,
    pub hit_radius: f32,
    pub max_health: i32,

    /// Hardware radar range; requests for more are clamped to it.
    pub radar_range: f32,
    pub transmission_range: f32,

    pub extraction_radius: f32,
    /// Units moved from a resource node per extraction request.
    pub extraction_amount: u32,
    pub extractor_capacity: u32,
    /// Distance within which a transporter can trade cargo.
    pub transfer_reach: f32,
    pub transporter_capacity: u32,
    pub facility_queue_len: usize,
    /// Stored resources consumed to research one technology.
    pub research_cost: u32,
    /// Technology names a facility accepts, hashed with [`TechHash::of`].
    pub known_technologies: Vec<String>,

    pub pendrive_blocks: usize,
    /// Ticks between compilation-record garbage collections; 0 disables.
    pub gc_interval_ticks: u64,

    pub queues: QueueCapacities,
    pub scheduler: SchedulerConfig,
    pub engine: EngineConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            tick_hz: 60,
            drive_speed: 2.0,
            drive_turn_rate: 6.0,
            turret_turn_rate: 4.0,
            turret_cooldown_ticks: 30,
            projectile_speed: 8.0,
            projectile_lifetime_ticks: 60,
            projectile_damage: 10,
            hit_radius: 1.5,
            max_health: 100,
            radar_range: 200.0,
            transmission_range: 300.0,
            extraction_radius: 10.0,
            extraction_amount: 5,
            extractor_capacity: 100,
            transfer_reach: 8.0,
            transporter_capacity: 50,
            facility_queue_len: 8,
            research_cost: 20,
            known_technologies: vec![
                "armor".to_string(),
                "engines".to_string(),
                "optics".to_string(),
            ],
            pendrive_blocks: 4,
            gc_interval_ticks: 600,
            queues: QueueCapacities::default(),
            scheduler: SchedulerConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl SimConfig {
    /// Reads a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Defaults or `path`, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, SimError> {
        let mut config = match path {
            Some(path) => SimConfig::from_file(path)?,
            None => SimConfig::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), SimError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Applies `BOTFORGE_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), SimError> {
        if let Some(value) = lookup("BOTFORGE_TICK_HZ") {
            self.tick_hz = parse("BOTFORGE_TICK_HZ", &value)?;
        }
        if let Some(value) = lookup("BOTFORGE_INSTRUCTION_BUDGET") {
            self.engine.instruction_budget = parse("BOTFORGE_INSTRUCTION_BUDGET", &value)?;
        }
        if let Some(value) = lookup("BOTFORGE_TRACE") {
            self.engine.trace_enabled = parse("BOTFORGE_TRACE", &value)?;
        }
        if let Some(value) = lookup("BOTFORGE_RETRY_BACKOFF_MS") {
            let ms: u64 = parse("BOTFORGE_RETRY_BACKOFF_MS", &value)?;
            self.scheduler.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(value) = lookup("BOTFORGE_SYNC_INTERVAL_MS") {
            let ms: u64 = parse("BOTFORGE_SYNC_INTERVAL_MS", &value)?;
            self.scheduler.sync_interval = Duration::from_millis(ms);
        }
        if let Some(value) = lookup("BOTFORGE_GC_INTERVAL_TICKS") {
            self.gc_interval_ticks = parse("BOTFORGE_GC_INTERVAL_TICKS", &value)?;
        }
        Ok(())
    }

    /// Length of one tick. A zero rate is treated as 1 Hz.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_hz.max(1)))
    }

    pub fn technology_hashes(&self) -> Vec<TechHash> {
        self.known_technologies
            .iter()
            .map(|name| TechHash::of(name))
            .collect()
    }
}

fn parse<T: FromStr>(var: &str, value: &str) -> Result<T, SimError> {
    value.trim().parse().map_err(|_| SimError::InvalidOverride {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = SimConfig::default();
        assert_eq!(config.tick_hz, 60);
        assert_eq!(config.engine.instruction_budget, 256);
        assert_eq!(config.scheduler.retry_backoff, Duration::from_secs(5));
        assert_eq!(config.tick_duration(), Duration::from_micros(16_666));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "tick_hz": 20, "engine": {{ "instruction_budget": 64 }} }}"#
        )
        .unwrap();

        let config = SimConfig::from_file(file.path()).unwrap();
        assert_eq!(config.tick_hz, 20);
        assert_eq!(config.engine.instruction_budget, 64);
        assert!(!config.engine.trace_enabled);
        assert_eq!(config.radar_range, 200.0);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SimConfig::from_file(Path::new("/nonexistent/botforge.json")).unwrap_err();
        assert!(matches!(err, SimError::Io { .. }));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = SimConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, SimError::ConfigParse(_)));
    }

    #[test]
    fn overrides_apply() {
        let vars = env(&[
            ("BOTFORGE_TICK_HZ", "30"),
            ("BOTFORGE_INSTRUCTION_BUDGET", "1000"),
            ("BOTFORGE_RETRY_BACKOFF_MS", "250"),
            ("BOTFORGE_TRACE", "true"),
            ("BOTFORGE_GC_INTERVAL_TICKS", "0"),
        ]);
        let mut config = SimConfig::default();
        config.apply_overrides(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.tick_hz, 30);
        assert_eq!(config.engine.instruction_budget, 1000);
        assert_eq!(config.scheduler.retry_backoff, Duration::from_millis(250));
        assert!(config.engine.trace_enabled);
        assert_eq!(config.gc_interval_ticks, 0);
        assert_eq!(config.scheduler.sync_interval, Duration::from_secs(1));
    }

    #[test]
    fn bad_override_names_the_variable() {
        let vars = env(&[("BOTFORGE_TICK_HZ", "fast")]);
        let err = SimConfig::default()
            .apply_overrides(|k| vars.get(k).cloned())
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid value \"fast\" for BOTFORGE_TICK_HZ");
    }

    #[test]
    fn technology_hashes_follow_names() {
        let config = SimConfig {
            known_technologies: vec!["armor".into()],
            ..SimConfig::default()
        };
        assert_eq!(config.technology_hashes(), vec![TechHash::of("armor")]);
    }
}
