//! The authoritative simulation: intent application and the fixed-order
//! world tick.

use crate::ai;
use crate::combat;
use crate::config::GameConfig;
use crate::entity::{DamageBoost, Player, PlayerId};
use crate::projectile;
use crate::world::{Identity, World};
use log::{debug, info, warn};
use rand::Rng;
use shared::{ClientIntent, PlayerView, ServerEvent, Vector2};
use std::time::Duration;

pub struct Game {
    pub world: World,
}

impl Game {
    pub fn new(config: GameConfig, seed: u64) -> Self {
        Self {
            world: World::populated(config, seed),
        }
    }

    pub fn from_world(world: World) -> Self {
        Self { world }
    }

    pub fn add_player(&mut self, id: PlayerId, identity: Identity, weapon_bonus: f32) -> PlayerView {
        self.world.add_player(id, identity, weapon_bonus)
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        self.world.remove_player(id)
    }

    pub fn set_weapon_bonus(&mut self, id: PlayerId, bonus: f32) {
        if let Some(player) = self.world.players.get_mut(id) {
            player.weapon_bonus = bonus;
            debug!("Player {} weapon bonus now {}", id, bonus);
        }
    }

    /// Applies one gameplay intent from `player_id`.
    ///
    /// Intents for unknown players, malformed payloads and progression
    /// requests produce nothing. Melee swings are only queued here and
    /// resolved by the next tick.
    pub fn apply_intent(&mut self, player_id: PlayerId, intent: &ClientIntent) -> Vec<ServerEvent> {
        if !intent.is_well_formed() {
            warn!("Dropping malformed intent from player {}: {:?}", player_id, intent);
            return Vec::new();
        }
        let now = self.world.now_ms();
        let config = &self.world.config;

        match intent {
            ClientIntent::PlayerMove {
                velocity_x,
                velocity_y,
                facing_angle,
            } => {
                let max_speed = config.player_max_speed;
                if let Some(player) = self.alive_player(player_id) {
                    player.velocity =
                        Vector2::new(*velocity_x, *velocity_y).clamp_length(max_speed);
                    player.facing_angle = *facing_angle;
                }
                Vec::new()
            }
            ClientIntent::PlayerAttack => {
                if let Some(player) = self.alive_player(player_id) {
                    player.pending_attack = true;
                }
                Vec::new()
            }
            ClientIntent::PlayerDash {
                velocity_x,
                velocity_y,
                damage_boost,
                duration,
            } => {
                let max_speed = config.max_dash_speed;
                let multiplier = (*damage_boost).clamp(1.0, config.max_dash_boost);
                let duration = (*duration).min(config.max_dash_duration_ms);
                if let Some(player) = self.alive_player(player_id) {
                    player.velocity =
                        Vector2::new(*velocity_x, *velocity_y).clamp_length(max_speed);
                    player.boost = Some(DamageBoost {
                        multiplier,
                        expires_at_ms: now + duration,
                    });
                    debug!("Player {} dashed with {:.2}x boost", player_id, multiplier);
                }
                Vec::new()
            }
            ClientIntent::ThrowSword { angle } => {
                projectile::throw_sword(&mut self.world, player_id, *angle)
                    .into_iter()
                    .collect()
            }
            ClientIntent::CollectResource(resource_id) => {
                combat::collect_resource(&mut self.world, player_id, *resource_id)
                    .into_iter()
                    .collect()
            }
            ClientIntent::Respawn => self.respawn(player_id).into_iter().collect(),
            _ => {
                debug!("Progression intent reached the simulation; ignoring");
                Vec::new()
            }
        }
    }

    fn alive_player(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.world.players.get_mut(id).filter(|p| p.is_alive())
    }

    /// Brings a dead player back at a random safe-zone point.
    fn respawn(&mut self, player_id: PlayerId) -> Option<ServerEvent> {
        if self.world.players.get(player_id)?.is_alive() {
            return None;
        }
        let position = self.world.random_safe_position();
        let player = self.world.players.get_mut(player_id)?;
        player.position = position;
        player.velocity = Vector2::ZERO;
        player.vitals.restore();
        player.boost = None;
        player.pending_attack = false;
        info!("Player {} respawned", player_id);

        Some(ServerEvent::PlayerRespawned {
            player_id,
            x: position.x,
            y: position.y,
            health: player.vitals.health,
        })
    }

    /// Advances the world by one tick.
    ///
    /// Order: players, queued melee swings, enemy AI, dead-enemy cleanup,
    /// extra spawn, projectiles. The returned events end with the
    /// `gameState` snapshot, followed by a `swordUpdate` batch when swords
    /// are in flight.
    pub fn tick(&mut self, dt: Duration) -> Vec<ServerEvent> {
        let dt = dt.min(Duration::from_millis(self.world.config.max_delta_ms));
        self.world.advance_clock(dt);

        let mut events = Vec::new();
        self.update_players(dt);

        let swings: Vec<PlayerId> = self
            .world
            .players
            .values()
            .filter(|p| p.pending_attack)
            .map(|p| p.id)
            .collect();
        for player_id in swings {
            events.extend(combat::resolve_melee(&mut self.world, player_id));
        }

        events.extend(ai::update_enemies(&mut self.world, dt));
        events.extend(self.cleanup_dead_enemies());
        events.extend(self.maybe_spawn_enemy());
        events.extend(projectile::advance_projectiles(&mut self.world, dt));

        events.push(self.world.snapshot());
        events.extend(projectile::sword_batch(&self.world));

        if self.world.tick() % 60 == 0 {
            debug!(
                "Tick {}: {} players, {} enemies alive, {} swords, dt {:?}",
                self.world.tick(),
                self.world.players.len(),
                self.world.alive_enemy_count(),
                self.world.projectiles.len(),
                dt
            );
        }
        events
    }

    fn update_players(&mut self, dt: Duration) {
        let secs = dt.as_secs_f32();
        let friction = self.world.config.friction;
        let border_damage = self.world.config.border_damage;
        let world_size = self.world.config.world_size;
        let (min, max) = (
            self.world.config.safe_zone_min(),
            self.world.config.safe_zone_max(),
        );

        for player in self.world.players.values_mut() {
            if !player.is_alive() {
                continue;
            }
            let step = player.velocity.scale(secs);
            player.position = shared::clamp_to_world(player.position.add(&step), world_size);
            player.velocity = player.velocity.scale(friction);

            let p = player.position;
            let in_safe_zone = p.x >= min && p.x <= max && p.y >= min && p.y <= max;
            if !in_safe_zone && player.vitals.take_damage(border_damage) {
                info!("Player {} died in the border zone", player.id);
            }
        }
    }

    /// Removes enemies whose grace window has passed and tops the
    /// population back up.
    fn cleanup_dead_enemies(&mut self) -> Vec<ServerEvent> {
        let now = self.world.now_ms();
        let delay = self.world.config.cleanup_delay_ms;
        let expired: Vec<_> = self
            .world
            .enemies
            .values()
            .filter(|e| matches!(e.death_time_ms, Some(t) if now.saturating_sub(t) >= delay))
            .map(|e| e.id)
            .collect();

        let mut events = Vec::new();
        for enemy_id in expired {
            self.world.enemies.remove(enemy_id);
            debug!("Enemy {} removed", enemy_id);
            events.push(ServerEvent::EnemyRemoved { enemy_id });

            if self.world.alive_enemy_count() < self.world.config.max_enemies {
                events.extend(self.spawn_event());
            }
        }
        events
    }

    fn maybe_spawn_enemy(&mut self) -> Option<ServerEvent> {
        if self.world.alive_enemy_count() >= self.world.config.max_enemies {
            return None;
        }
        let chance = self.world.config.spawn_chance;
        if self.world.rng.gen_bool(chance) {
            self.spawn_event()
        } else {
            None
        }
    }

    fn spawn_event(&mut self) -> Option<ServerEvent> {
        let id = self.world.spawn_enemy();
        let enemy = self.world.enemies.get(id)?;
        Some(ServerEvent::EnemySpawned(enemy.to_view()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const TICK: Duration = Duration::from_millis(16);

    fn quiet_config() -> GameConfig {
        GameConfig {
            max_enemies: 0,
            initial_resources: 0,
            spawn_chance: 0.0,
            ..GameConfig::default()
        }
    }

    fn game_with_player(config: GameConfig, at: Vector2) -> Game {
        let mut game = Game::new(config, 17);
        game.add_player(
            1,
            Identity {
                user_id: "u1".into(),
                username: "ada".into(),
            },
            0.0,
        );
        game.world.players.get_mut(1).unwrap().position = at;
        game
    }

    fn names(events: &[ServerEvent]) -> Vec<&'static str> {
        events.iter().map(ServerEvent::name).collect()
    }

    #[test]
    fn test_tick_ends_with_snapshot() {
        let mut game = game_with_player(quiet_config(), Vector2::new(1000.0, 1000.0));
        let events = game.tick(TICK);
        assert_eq!(names(&events), vec!["gameState"]);

        game.apply_intent(1, &ClientIntent::ThrowSword { angle: 0.0 });
        let events = game.tick(TICK);
        assert_eq!(names(&events), vec!["gameState", "swordUpdate"]);
    }

    #[test]
    fn test_move_is_clamped_and_decays() {
        let mut game = game_with_player(quiet_config(), Vector2::new(1000.0, 1000.0));
        game.apply_intent(
            1,
            &ClientIntent::PlayerMove {
                velocity_x: 5000.0,
                velocity_y: 0.0,
                facing_angle: 0.5,
            },
        );
        let player = game.world.players.get(1).unwrap();
        assert_approx_eq!(player.velocity.x, 400.0, 1e-3);
        assert_eq!(player.facing_angle, 0.5);

        game.tick(Duration::from_millis(10));
        let player = game.world.players.get(1).unwrap();
        assert_approx_eq!(player.position.x, 1004.0, 1e-3);
        assert_approx_eq!(player.velocity.x, 380.0, 1e-3);
    }

    #[test]
    fn test_positions_stay_in_bounds() {
        let config = GameConfig {
            max_enemies: 10,
            ..quiet_config()
        };
        let mut game = Game::new(config, 5);
        for id in 1..=4 {
            game.add_player(
                id,
                Identity {
                    user_id: format!("u{}", id),
                    username: format!("p{}", id),
                },
                0.0,
            );
        }
        for i in 0..600u32 {
            for id in 1..=4 {
                let angle = (i * id) as f32 * 0.1;
                game.apply_intent(
                    id,
                    &ClientIntent::PlayerMove {
                        velocity_x: angle.cos() * 400.0,
                        velocity_y: angle.sin() * 400.0,
                        facing_angle: angle,
                    },
                );
            }
            game.tick(Duration::from_millis(50));
            let size = game.world.config.world_size;
            for player in game.world.players.values() {
                assert!(shared::in_world(&player.position, size));
                assert!(player.vitals.health >= 0.0);
            }
            for enemy in game.world.enemies.values() {
                assert!(shared::in_world(&enemy.position, size));
                assert!(enemy.vitals.health >= 0.0);
            }
        }
    }

    #[test]
    fn test_border_damage_per_tick() {
        let mut game = game_with_player(quiet_config(), Vector2::new(100.0, 100.0));
        game.world.players.get_mut(1).unwrap().vitals.health = 5.0;

        for expected in (1..5).rev() {
            game.tick(TICK);
            let player = game.world.players.get(1).unwrap();
            assert_eq!(player.vitals.health, expected as f32);
            assert!(player.is_alive());
        }
        game.tick(TICK);
        let player = game.world.players.get(1).unwrap();
        assert_eq!(player.vitals.health, 0.0);
        assert!(!player.is_alive());

        game.tick(TICK);
        assert_eq!(game.world.players.get(1).unwrap().vitals.health, 0.0);
    }

    #[test]
    fn test_safe_zone_is_harmless() {
        let mut game = game_with_player(quiet_config(), Vector2::new(1500.0, 1500.0));
        for _ in 0..100 {
            game.tick(TICK);
        }
        assert_eq!(game.world.players.get(1).unwrap().vitals.health, 100.0);
    }

    #[test]
    fn test_melee_scenario_with_cleanup_and_replacement() {
        let config = GameConfig {
            max_enemies: 1,
            enemy_attack_damage: 0.0,
            enemy_knockback: 0.0,
            ..quiet_config()
        };
        let mut world = World::new(config, 23);
        world.add_player(
            1,
            Identity {
                user_id: "u1".into(),
                username: "ada".into(),
            },
            0.0,
        );
        let at = Vector2::new(1000.0, 1000.0);
        world.players.get_mut(1).unwrap().position = at;
        let enemy = world.spawn_enemy_at(Vector2::new(1020.0, 1000.0), 1);
        let mut game = Game::from_world(world);

        game.apply_intent(
            1,
            &ClientIntent::PlayerDash {
                velocity_x: 0.0,
                velocity_y: 0.0,
                damage_boost: 6.0,
                duration: 500,
            },
        );
        // Boost clamps to 3x: 20 * 3 = 60.
        game.apply_intent(1, &ClientIntent::PlayerAttack);
        let events = game.tick(TICK);
        assert!(events.contains(&ServerEvent::PlayerAttacked {
            player_id: 1,
            enemy_id: Some(enemy),
            damage: 60.0,
            enemy_health: 40.0,
            enemy_alive: true,
        }));

        for _ in 0..70 {
            game.tick(TICK);
        }
        let dash = ClientIntent::PlayerDash {
            velocity_x: 0.0,
            velocity_y: 0.0,
            damage_boost: 3.0,
            duration: 500,
        };
        game.apply_intent(1, &dash);
        game.apply_intent(1, &ClientIntent::PlayerAttack);
        let events = game.tick(TICK);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerAttacked { enemy_alive: false, enemy_id: Some(id), .. } if *id == enemy)));
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::ResourceDropped(_))));
        let death = game.world.enemies.get(enemy).unwrap().death_time_ms.unwrap();

        let mut later = Vec::new();
        while game.world.now_ms() < death + 2100 {
            later.extend(game.tick(TICK));
        }
        let lifecycle: Vec<_> = later
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    ServerEvent::EnemyRemoved { .. } | ServerEvent::EnemySpawned(_)
                )
            })
            .collect();
        assert_eq!(lifecycle.len(), 2);
        assert_eq!(lifecycle[0], &ServerEvent::EnemyRemoved { enemy_id: enemy });
        assert!(matches!(lifecycle[1], ServerEvent::EnemySpawned(view) if view.id != enemy));
        assert!(game.world.enemies.get(enemy).is_none());
        assert_eq!(game.world.alive_enemy_count(), 1);
    }

    #[test]
    fn test_queued_swing_rechecks_distance() {
        let mut game = game_with_player(quiet_config(), Vector2::new(1000.0, 1000.0));
        let enemy = game
            .world
            .spawn_enemy_at(Vector2::new(1030.0, 1000.0), 1);

        game.apply_intent(1, &ClientIntent::PlayerAttack);
        // The target slips away before the tick resolves the swing.
        game.world.enemies.get_mut(enemy).unwrap().position = Vector2::new(1200.0, 1000.0);
        let events = game.tick(TICK);
        assert!(events.contains(&ServerEvent::PlayerAttacked {
            player_id: 1,
            enemy_id: None,
            damage: 0.0,
            enemy_health: 0.0,
            enemy_alive: false,
        }));
        assert_eq!(game.world.enemies.get(enemy).unwrap().vitals.health, 100.0);
    }

    #[test]
    fn test_population_converges() {
        let config = GameConfig {
            max_enemies: 5,
            spawn_chance: 0.0,
            initial_resources: 0,
            ..GameConfig::default()
        };
        let mut game = Game::new(config, 31);
        assert_eq!(game.world.alive_enemy_count(), 5);

        let now = game.world.now_ms();
        for enemy in game.world.enemies.values_mut() {
            enemy.take_damage(1000.0, now);
        }
        assert_eq!(game.world.alive_enemy_count(), 0);

        for _ in 0..200 {
            game.tick(TICK);
        }
        assert_eq!(game.world.alive_enemy_count(), 5);
        assert_eq!(game.world.enemies.len(), 5);
    }

    #[test]
    fn test_extra_spawn_fills_population() {
        let config = GameConfig {
            max_enemies: 3,
            spawn_chance: 1.0,
            initial_resources: 0,
            ..GameConfig::default()
        };
        let mut game = Game::from_world(World::new(config, 2));
        let events = game.tick(TICK);
        assert_eq!(names(&events), vec!["enemySpawned", "gameState"]);
        game.tick(TICK);
        game.tick(TICK);
        game.tick(TICK);
        assert_eq!(game.world.alive_enemy_count(), 3);
    }

    #[test]
    fn test_respawn_only_when_dead() {
        let mut game = game_with_player(quiet_config(), Vector2::new(1000.0, 1000.0));
        assert!(game.apply_intent(1, &ClientIntent::Respawn).is_empty());

        game.world.players.get_mut(1).unwrap().vitals.take_damage(500.0);
        let events = game.apply_intent(1, &ClientIntent::Respawn);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::PlayerRespawned { player_id: 1, health, .. }] if *health == 100.0
        ));
        let player = game.world.players.get(1).unwrap();
        assert!(player.is_alive());
        assert!(game.world.is_in_safe_zone(&player.position));
    }

    #[test]
    fn test_malformed_and_dead_intents_ignored() {
        let mut game = game_with_player(quiet_config(), Vector2::new(1000.0, 1000.0));
        game.apply_intent(
            1,
            &ClientIntent::PlayerMove {
                velocity_x: f32::INFINITY,
                velocity_y: 0.0,
                facing_angle: 0.0,
            },
        );
        assert_eq!(game.world.players.get(1).unwrap().velocity, Vector2::ZERO);

        game.world.players.get_mut(1).unwrap().vitals.take_damage(500.0);
        game.apply_intent(
            1,
            &ClientIntent::PlayerMove {
                velocity_x: 100.0,
                velocity_y: 0.0,
                facing_angle: 0.0,
            },
        );
        assert_eq!(game.world.players.get(1).unwrap().velocity, Vector2::ZERO);
        assert!(game
            .apply_intent(7, &ClientIntent::ThrowSword { angle: 0.0 })
            .is_empty());
    }

    #[test]
    fn test_delta_is_capped() {
        let mut game = game_with_player(quiet_config(), Vector2::new(1000.0, 1000.0));
        game.tick(Duration::from_secs(5));
        assert_eq!(game.world.now_ms(), 50);
    }
}
