//! Enemy behavior, re-evaluated from scratch every tick.

use crate::entity::{EnemyId, PlayerId};
use crate::world::{nearest, World};
use log::{debug, info};
use rand::Rng;
use shared::{angle_between, EnemyBehavior, ServerEvent, Vector2};
use std::f32::consts::TAU;
use std::time::Duration;

/// Runs the wander/chase/attack state machine for every alive enemy and
/// integrates their movement. Returns the `enemyAttack` events produced.
pub fn update_enemies(world: &mut World, dt: Duration) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    for enemy_id in world.enemies.ids() {
        if let Some(event) = update_enemy(world, enemy_id, dt) {
            events.push(event);
        }
    }
    events
}

fn update_enemy(world: &mut World, enemy_id: EnemyId, dt: Duration) -> Option<ServerEvent> {
    let enemy = world.enemies.get(enemy_id)?;
    if !enemy.is_alive() {
        return None;
    }
    let origin = enemy.position;

    let target = nearest(&origin, world.players.values().filter(|p| p.is_alive()))
        .map(|(player, distance)| (player.id, player.position, distance));

    let mut event = None;
    match target {
        Some((player_id, _, distance)) if distance <= world.config.enemy_attack_range => {
            event = attack(world, enemy_id, player_id);
        }
        Some((_, position, distance)) if distance <= world.config.enemy_chase_range => {
            let speed = world.config.enemy_speed;
            let enemy = world.enemies.get_mut(enemy_id)?;
            let angle = angle_between(&origin, &position);
            enemy.state = EnemyBehavior::Chase;
            enemy.velocity = Vector2::from_angle(angle, speed);
            enemy.facing_angle = angle;
        }
        _ => wander(world, enemy_id, dt),
    }

    let world_size = world.config.world_size;
    let enemy = world.enemies.get_mut(enemy_id)?;
    let step = enemy.velocity.scale(dt.as_secs_f32());
    enemy.position = shared::clamp_to_world(enemy.position.add(&step), world_size);
    event
}

fn attack(world: &mut World, enemy_id: EnemyId, player_id: PlayerId) -> Option<ServerEvent> {
    let now = world.now_ms();
    let range = world.config.enemy_attack_range;
    let cooldown = world.config.enemy_attack_cooldown_ms;
    let damage = world.config.enemy_attack_damage;
    let knockback = world.config.enemy_knockback;

    let enemy = world.enemies.get_mut(enemy_id)?;
    enemy.state = EnemyBehavior::Attack;
    enemy.velocity = Vector2::ZERO;
    if let Some(last) = enemy.last_attack_ms {
        if now.saturating_sub(last) < cooldown {
            return None;
        }
    }

    let player = world.players.get_mut(player_id)?;
    let distance = enemy.position.distance_to(&player.position);
    if distance > range {
        debug!(
            "Enemy {} attack on player {} rejected: distance {:.0} > {:.0}",
            enemy_id, player_id, distance, range
        );
        return None;
    }

    let angle = angle_between(&enemy.position, &player.position);
    enemy.facing_angle = angle;
    enemy.last_attack_ms = Some(now);
    if player.vitals.take_damage(damage) {
        info!("Player {} was killed by enemy {}", player_id, enemy_id);
    }
    player.velocity = Vector2::from_angle(angle, knockback);

    Some(ServerEvent::EnemyAttack {
        enemy_id,
        target_id: player_id,
        damage,
    })
}

fn wander(world: &mut World, enemy_id: EnemyId, dt: Duration) {
    let speed = world.config.enemy_speed * 0.5;
    let (min_ms, max_ms) = (world.config.wander_min_ms, world.config.wander_max_ms);
    let Some(enemy) = world.enemies.get_mut(enemy_id) else {
        return;
    };
    enemy.state = EnemyBehavior::Wander;
    enemy.wander_timer_ms -= dt.as_secs_f32() * 1000.0;
    if enemy.wander_timer_ms > 0.0 {
        return;
    }

    let angle = world.rng.gen_range(0.0..TAU);
    let pace = world.rng.gen_range(0.5..=1.0);
    enemy.velocity = Vector2::from_angle(angle, speed * pace);
    enemy.facing_angle = angle;
    enemy.wander_timer_ms = world.rng.gen_range(min_ms..=max_ms) as f32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::world::Identity;
    use assert_approx_eq::assert_approx_eq;

    const TICK: Duration = Duration::from_millis(16);

    fn world_with_player(at: Vector2) -> World {
        let config = GameConfig {
            max_enemies: 0,
            initial_resources: 0,
            ..GameConfig::default()
        };
        let mut world = World::new(config, 9);
        world.add_player(
            1,
            Identity {
                user_id: "u1".into(),
                username: "ada".into(),
            },
            0.0,
        );
        world.players.get_mut(1).unwrap().position = at;
        world
    }

    #[test]
    fn test_enemy_attacks_in_range() {
        let mut world = world_with_player(Vector2::new(500.0, 500.0));
        let enemy = world.spawn_enemy_at(Vector2::new(470.0, 500.0), 1);

        let events = update_enemies(&mut world, TICK);
        assert_eq!(
            events,
            vec![ServerEvent::EnemyAttack {
                enemy_id: enemy,
                target_id: 1,
                damage: 15.0
            }]
        );
        let player = world.players.get(1).unwrap();
        assert_eq!(player.vitals.health, 85.0);
        assert_approx_eq!(player.velocity.x, 200.0, 1e-3);
        assert_approx_eq!(player.velocity.y, 0.0, 1e-3);

        let enemy = world.enemies.get(enemy).unwrap();
        assert_eq!(enemy.state, EnemyBehavior::Attack);
        assert_eq!(enemy.velocity, Vector2::ZERO);
        assert_eq!(enemy.position, Vector2::new(470.0, 500.0));
    }

    #[test]
    fn test_enemy_attack_cooldown() {
        let mut world = world_with_player(Vector2::new(500.0, 500.0));
        world.spawn_enemy_at(Vector2::new(470.0, 500.0), 1);

        assert_eq!(update_enemies(&mut world, TICK).len(), 1);
        world.advance_clock(Duration::from_millis(500));
        assert!(update_enemies(&mut world, TICK).is_empty());
        world.advance_clock(Duration::from_millis(500));
        assert_eq!(update_enemies(&mut world, TICK).len(), 1);
        assert_eq!(world.players.get(1).unwrap().vitals.health, 70.0);
    }

    #[test]
    fn test_enemy_kills_player_once() {
        let mut world = world_with_player(Vector2::new(500.0, 500.0));
        world.players.get_mut(1).unwrap().vitals.health = 10.0;
        world.spawn_enemy_at(Vector2::new(480.0, 500.0), 1);

        update_enemies(&mut world, TICK);
        let player = world.players.get(1).unwrap();
        assert_eq!(player.vitals.health, 0.0);
        assert!(!player.is_alive());

        // Dead players are no longer targets.
        world.advance_clock(Duration::from_millis(2000));
        assert!(update_enemies(&mut world, TICK).is_empty());
    }

    #[test]
    fn test_enemy_chases_nearby_player() {
        let mut world = world_with_player(Vector2::new(700.0, 500.0));
        let enemy = world.spawn_enemy_at(Vector2::new(500.0, 500.0), 1);

        assert!(update_enemies(&mut world, Duration::from_millis(100)).is_empty());
        let enemy = world.enemies.get(enemy).unwrap();
        assert_eq!(enemy.state, EnemyBehavior::Chase);
        assert_approx_eq!(enemy.velocity.x, 100.0, 1e-3);
        assert_approx_eq!(enemy.position.x, 510.0, 1e-3);
        assert_approx_eq!(enemy.facing_angle, 0.0, 1e-6);
    }

    #[test]
    fn test_enemy_wanders_without_target() {
        let mut world = world_with_player(Vector2::new(2000.0, 2000.0));
        let enemy = world.spawn_enemy_at(Vector2::new(500.0, 500.0), 1);

        update_enemies(&mut world, TICK);
        let enemy = world.enemies.get(enemy).unwrap();
        assert_eq!(enemy.state, EnemyBehavior::Wander);
        let speed = enemy.velocity.magnitude();
        assert!((24.99..=50.01).contains(&speed), "speed {}", speed);
        assert!((1000.0..=3000.0).contains(&enemy.wander_timer_ms));
    }

    #[test]
    fn test_wander_keeps_heading_until_timer_lapses() {
        let mut world = world_with_player(Vector2::new(2000.0, 2000.0));
        let enemy = world.spawn_enemy_at(Vector2::new(1000.0, 1000.0), 1);

        update_enemies(&mut world, TICK);
        let heading = world.enemies.get(enemy).unwrap().velocity;
        update_enemies(&mut world, TICK);
        assert_eq!(world.enemies.get(enemy).unwrap().velocity, heading);
    }

    #[test]
    fn test_enemy_stays_in_world() {
        let mut world = world_with_player(Vector2::new(2000.0, 2000.0));
        let enemy = world.spawn_enemy_at(Vector2::new(0.0, 0.0), 1);
        for _ in 0..500 {
            update_enemies(&mut world, Duration::from_millis(50));
            let position = world.enemies.get(enemy).unwrap().position;
            assert!(shared::in_world(&position, world.config.world_size));
        }
    }

    #[test]
    fn test_dead_enemy_is_inert() {
        let mut world = world_with_player(Vector2::new(500.0, 500.0));
        let enemy = world.spawn_enemy_at(Vector2::new(480.0, 500.0), 1);
        world.enemies.get_mut(enemy).unwrap().take_damage(500.0, 0);

        assert!(update_enemies(&mut world, TICK).is_empty());
        assert_eq!(world.players.get(1).unwrap().vitals.health, 100.0);
    }
}
