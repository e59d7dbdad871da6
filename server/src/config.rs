//! Tunable simulation constants.
//!
//! Every number that shapes gameplay lives in [`GameConfig`]. The defaults
//! are the live tuning; a JSON file passed with `--config` may override any
//! subset of the keys.

use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    // World
    pub world_size: f32,
    pub border_thickness: f32,
    pub max_enemies: usize,
    pub initial_resources: usize,

    // Players
    pub player_max_health: f32,
    pub player_max_speed: f32,
    /// Per-tick velocity decay factor.
    pub friction: f32,
    /// Health lost per tick outside the safe zone.
    pub border_damage: f32,
    pub collect_radius: f32,

    // Melee
    pub attack_range: f32,
    pub base_damage: f32,
    pub attack_cooldown_ms: u64,
    pub melee_knockback: f32,
    /// Swing hits every enemy in range; when false only the nearest.
    pub melee_hits_all: bool,
    pub max_dash_speed: f32,
    pub max_dash_boost: f32,
    pub max_dash_duration_ms: u64,

    // Enemies
    pub enemy_max_health: f32,
    pub enemy_chase_range: f32,
    pub enemy_attack_range: f32,
    pub enemy_speed: f32,
    pub enemy_attack_cooldown_ms: u64,
    pub enemy_attack_damage: f32,
    pub enemy_knockback: f32,
    pub enemy_max_level: u32,
    pub wander_min_ms: u64,
    pub wander_max_ms: u64,
    /// Grace window between an enemy's death and its removal.
    pub cleanup_delay_ms: u64,
    /// Per-tick probability of an extra spawn while under population.
    pub spawn_chance: f64,
    pub drop_jitter: f32,

    // Thrown swords
    pub sword_speed: f32,
    pub sword_max_distance: f32,
    pub sword_lifetime_ms: u64,
    pub sword_hit_radius: f32,
    pub sword_damage: f32,
    pub sword_knockback: f32,
    pub throw_cooldown_ms: u64,

    // Duels
    pub duel_challenge_secs: u64,
    pub duel_max_secs: u64,
    pub duel_winner_experience: u32,

    // Loop
    pub max_delta_ms: u64,
    /// A session silent for this long is dropped. The server pings every
    /// session at a third of this period.
    pub idle_timeout_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            world_size: 3000.0,
            border_thickness: 200.0,
            max_enemies: 15,
            initial_resources: 20,

            player_max_health: 100.0,
            player_max_speed: 400.0,
            friction: 0.95,
            border_damage: 1.0,
            collect_radius: 30.0,

            attack_range: 50.0,
            base_damage: 20.0,
            attack_cooldown_ms: 1000,
            melee_knockback: 200.0,
            melee_hits_all: true,
            max_dash_speed: 1000.0,
            max_dash_boost: 3.0,
            max_dash_duration_ms: 1000,

            enemy_max_health: 100.0,
            enemy_chase_range: 300.0,
            enemy_attack_range: 50.0,
            enemy_speed: 100.0,
            enemy_attack_cooldown_ms: 1000,
            enemy_attack_damage: 15.0,
            enemy_knockback: 200.0,
            enemy_max_level: 3,
            wander_min_ms: 1000,
            wander_max_ms: 3000,
            cleanup_delay_ms: 2000,
            spawn_chance: 0.01,
            drop_jitter: 40.0,

            sword_speed: 400.0,
            sword_max_distance: 500.0,
            sword_lifetime_ms: 2000,
            sword_hit_radius: 25.0,
            sword_damage: 30.0,
            sword_knockback: 300.0,
            throw_cooldown_ms: 500,

            duel_challenge_secs: 30,
            duel_max_secs: 300,
            duel_winner_experience: 100,

            max_delta_ms: 50,
            idle_timeout_secs: 30,
        }
    }
}

impl GameConfig {
    /// Loads a JSON overlay; keys absent from the file keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let config: GameConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.world_size <= 0.0 {
            return Err(ServerError::InvalidConfig("world_size must be positive".into()));
        }
        if self.border_thickness < 0.0 || self.border_thickness * 2.0 >= self.world_size {
            return Err(ServerError::InvalidConfig(
                "border_thickness must leave a non-empty safe zone".into(),
            ));
        }
        if self.wander_min_ms > self.wander_max_ms {
            return Err(ServerError::InvalidConfig(
                "wander_min_ms must not exceed wander_max_ms".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.spawn_chance) {
            return Err(ServerError::InvalidConfig("spawn_chance must be within 0..=1".into()));
        }
        if self.max_dash_boost < 1.0 {
            return Err(ServerError::InvalidConfig("max_dash_boost must be at least 1".into()));
        }
        if self.enemy_max_level == 0 {
            return Err(ServerError::InvalidConfig("enemy_max_level must be at least 1".into()));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ServerError::InvalidConfig("idle_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn safe_zone_min(&self) -> f32 {
        self.border_thickness
    }

    pub fn safe_zone_max(&self) -> f32 {
        self.world_size - self.border_thickness
    }
}
