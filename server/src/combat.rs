//! Server-side combat and collection resolution.
//!
//! Every function here takes the world explicitly, mutates it, and returns
//! the events the mutation produced. Broadcasting is the caller's business.
//! All distance checks use the positions held by the world at the moment
//! of mutation, never anything a client reported.

use crate::entity::{EnemyId, PlayerId, ProjectileId, ResourceId};
use crate::world::{nearest, World};
use log::{debug, info};
use shared::{ServerEvent, Vector2};

/// Outcome of a single damage application against an enemy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub enemy_id: EnemyId,
    pub damage: f32,
    pub enemy_health: f32,
    pub enemy_alive: bool,
}

/// Resolves a melee swing by `attacker_id`.
///
/// Does nothing when the attacker is gone, dead, or still cooling down.
/// Otherwise hits every alive enemy within reach (or only the nearest one
/// when the swing is single-target) and emits one `playerAttacked` per hit,
/// or a single zero-damage `playerAttacked` when the swing connects with
/// nothing.
pub fn resolve_melee(world: &mut World, attacker_id: PlayerId) -> Vec<ServerEvent> {
    let now = world.now_ms();
    let cooldown = world.config.attack_cooldown_ms;

    let (origin, damage) = match world.players.get_mut(attacker_id) {
        Some(player) => {
            player.pending_attack = false;
            if !player.is_alive() {
                return Vec::new();
            }
            if let Some(last) = player.last_attack_ms {
                if now.saturating_sub(last) < cooldown {
                    return Vec::new();
                }
            }
            player.last_attack_ms = Some(now);
            let damage =
                world.config.base_damage * player.damage_multiplier(now) + player.weapon_bonus;
            (player.position, damage)
        }
        None => return Vec::new(),
    };

    let range = world.config.attack_range;
    let targets: Vec<EnemyId> = if world.config.melee_hits_all {
        world
            .enemies
            .values()
            .filter(|e| e.is_alive() && origin.distance_to(&e.position) <= range)
            .map(|e| e.id)
            .collect()
    } else {
        nearest(&origin, world.enemies.values().filter(|e| e.is_alive()))
            .filter(|(_, distance)| *distance <= range)
            .map(|(e, _)| vec![e.id])
            .unwrap_or_default()
    };

    let mut events = Vec::new();
    let mut connected = false;
    for enemy_id in targets {
        let knockback = world.config.melee_knockback;
        let Some(hit) = apply_hit(world, origin, enemy_id, range, damage, knockback, &mut events)
        else {
            continue;
        };
        connected = true;
        // Loot events precede the attack event on the killing hit.
        events.push(ServerEvent::PlayerAttacked {
            player_id: attacker_id,
            enemy_id: Some(hit.enemy_id),
            damage: hit.damage,
            enemy_health: hit.enemy_health,
            enemy_alive: hit.enemy_alive,
        });
    }

    if !connected {
        events.push(ServerEvent::PlayerAttacked {
            player_id: attacker_id,
            enemy_id: None,
            damage: 0.0,
            enemy_health: 0.0,
            enemy_alive: false,
        });
    }
    events
}

/// Damages one enemy from `origin`, re-checking that it is still alive and
/// within `reach` using the positions held right now.
///
/// On the killing hit the death is stamped and the drop table rolled; the
/// resulting `resourceDropped` events are appended to `events`. Survivors
/// are pushed away from `origin` at `knockback` speed.
pub fn apply_hit(
    world: &mut World,
    origin: Vector2,
    enemy_id: EnemyId,
    reach: f32,
    damage: f32,
    knockback: f32,
    events: &mut Vec<ServerEvent>,
) -> Option<Hit> {
    let now = world.now_ms();
    let enemy = world.enemies.get_mut(enemy_id)?;
    if !enemy.is_alive() {
        return None;
    }
    let distance = origin.distance_to(&enemy.position);
    if distance > reach {
        debug!(
            "Hit on enemy {} rejected: distance {:.0} > {:.0}",
            enemy_id, distance, reach
        );
        return None;
    }

    let died = enemy.take_damage(damage, now);
    if !died {
        let angle = shared::angle_between(&origin, &enemy.position);
        enemy.velocity = Vector2::from_angle(angle, knockback);
    }
    let hit = Hit {
        enemy_id,
        damage,
        enemy_health: enemy.vitals.health,
        enemy_alive: enemy.is_alive(),
    };

    if died {
        let (position, level) = (enemy.position, enemy.level);
        info!("Enemy {} killed (level {})", enemy_id, level);
        events.extend(world.drop_loot(position, level));
    }
    Some(hit)
}

/// Resolves the collision of one projectile against the enemies around it.
///
/// The first alive enemy (in id order) within the hit radius takes the
/// projectile's damage. Returns the `swordHit` event plus any loot, or
/// nothing when the projectile touched no enemy.
pub fn resolve_projectile_hit(world: &mut World, projectile_id: ProjectileId) -> Vec<ServerEvent> {
    let Some(projectile) = world.projectiles.get(projectile_id) else {
        return Vec::new();
    };
    let (origin, damage) = (projectile.position, projectile.damage);
    let radius = world.config.sword_hit_radius;

    let target = world
        .enemies
        .values()
        .find(|e| e.is_alive() && origin.distance_to(&e.position) <= radius)
        .map(|e| e.id);

    let mut events = Vec::new();
    if let Some(enemy_id) = target {
        let knockback = world.config.sword_knockback;
        if let Some(hit) = apply_hit(world, origin, enemy_id, radius, damage, knockback, &mut events)
        {
            events.push(ServerEvent::SwordHit {
                sword_id: projectile_id,
                enemy_id: hit.enemy_id,
                damage: hit.damage,
                enemy_health: hit.enemy_health,
                enemy_alive: hit.enemy_alive,
            });
        }
    }
    events
}

/// Claims a pickup for `player_id`.
///
/// The pickup is removed from the world in the same step that credits the
/// player, so a second claim for the same id finds nothing and is ignored.
pub fn collect_resource(
    world: &mut World,
    player_id: PlayerId,
    resource_id: ResourceId,
) -> Option<ServerEvent> {
    let player = world.players.get(player_id)?;
    if !player.is_alive() {
        return None;
    }
    let pickup = world.resources.get(resource_id)?;
    let distance = player.position.distance_to(&pickup.position);
    if distance > world.config.collect_radius {
        debug!(
            "Player {} collect of {} rejected: distance {:.0}",
            player_id, resource_id, distance
        );
        return None;
    }

    let pickup = world.resources.remove(resource_id)?;
    let (kind, amount) = (pickup.yield_kind(), pickup.yield_amount());
    let player = world.players.get_mut(player_id)?;
    player.credit(kind, amount);

    Some(ServerEvent::ResourceCollected {
        resource_id,
        player_id,
        resource_type: kind,
        resource_amount: amount,
    })
}
