//! Thrown swords: creation, flight and expiry.

use crate::combat;
use crate::entity::{PlayerId, Projectile};
use crate::world::World;
use log::debug;
use shared::{in_world, ServerEvent, Vector2};
use std::time::Duration;

/// Launches a sword from the thrower's current position.
///
/// Ignored for unknown or dead players and while the throw cooldown runs.
pub fn throw_sword(world: &mut World, player_id: PlayerId, angle: f32) -> Option<ServerEvent> {
    let now = world.now_ms();
    let cooldown = world.config.throw_cooldown_ms;
    let player = world.players.get_mut(player_id)?;
    if !player.is_alive() {
        return None;
    }
    if let Some(last) = player.last_throw_ms {
        if now.saturating_sub(last) < cooldown {
            debug!("Player {} throw ignored: cooling down", player_id);
            return None;
        }
    }
    player.last_throw_ms = Some(now);
    let (position, bonus) = (player.position, player.weapon_bonus);

    let id = world.projectiles.allocate_id();
    let projectile = Projectile {
        id,
        owner_id: player_id,
        position,
        velocity: Vector2::from_angle(angle, world.config.sword_speed),
        angle,
        damage: world.config.sword_damage + bonus,
        traveled: 0.0,
        max_distance: world.config.sword_max_distance,
        created_at_ms: now,
        lifetime_ms: world.config.sword_lifetime_ms,
    };
    world.projectiles.insert(id, projectile);

    Some(ServerEvent::SwordThrown {
        id,
        player_id,
        x: position.x,
        y: position.y,
        angle,
    })
}

/// Moves every sword, resolves collisions and removes the spent ones.
///
/// Each removed sword yields exactly one `swordRemoved`, whatever the
/// combination of reasons that ended its flight.
pub fn advance_projectiles(world: &mut World, dt: Duration) -> Vec<ServerEvent> {
    let secs = dt.as_secs_f32();
    let now = world.now_ms();
    let world_size = world.config.world_size;
    let mut events = Vec::new();

    for id in world.projectiles.ids() {
        let Some(projectile) = world.projectiles.get_mut(id) else {
            continue;
        };
        let step = projectile.velocity.scale(secs);
        projectile.position = projectile.position.add(&step);
        projectile.traveled += step.magnitude();
        let escaped = !in_world(&projectile.position, world_size);
        let spent = projectile.is_spent(now);

        let mut hit = false;
        if !escaped {
            let outcome = combat::resolve_projectile_hit(world, id);
            hit = outcome
                .iter()
                .any(|e| matches!(e, ServerEvent::SwordHit { .. }));
            events.extend(outcome);
        }

        if hit || spent || escaped {
            world.projectiles.remove(id);
            events.push(ServerEvent::SwordRemoved { sword_id: id });
        }
    }
    events
}

/// Batched positions of the swords still in flight, if any.
pub fn sword_batch(world: &World) -> Option<ServerEvent> {
    if world.projectiles.is_empty() {
        return None;
    }
    Some(ServerEvent::SwordUpdate(
        world.projectiles.values().map(Projectile::to_view).collect(),
    ))
}
