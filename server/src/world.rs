//! The World aggregate: every entity collection, the simulation clock and
//! the random source, owned in one place and passed explicitly to each
//! system.

use crate::config::GameConfig;
use crate::entity::{
    Enemy, EnemyId, Entity, EntityStore, Player, PlayerId, Projectile, ResourcePickup,
};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{clamp_to_world, PlayerView, ResourceKind, ServerEvent, Vector2};
use std::time::Duration;

/// Drop chance per resource kind, rolled independently on each enemy death.
pub const DROP_TABLE: [(ResourceKind, f64); 6] = [
    (ResourceKind::Iron, 0.8),
    (ResourceKind::Wood, 0.6),
    (ResourceKind::Stone, 0.5),
    (ResourceKind::Steel, 0.3),
    (ResourceKind::Crystal, 0.1),
    (ResourceKind::Mythril, 0.02),
];

/// Verified identity of a connected user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

pub struct World {
    pub config: GameConfig,
    pub players: EntityStore<Player>,
    pub enemies: EntityStore<Enemy>,
    pub resources: EntityStore<ResourcePickup>,
    pub projectiles: EntityStore<Projectile>,
    pub rng: StdRng,
    clock_us: u64,
    tick: u64,
}

impl World {
    /// Creates an empty world.
    pub fn new(config: GameConfig, seed: u64) -> Self {
        Self {
            config,
            players: EntityStore::new(),
            enemies: EntityStore::new(),
            resources: EntityStore::new(),
            projectiles: EntityStore::new(),
            rng: StdRng::seed_from_u64(seed),
            clock_us: 0,
            tick: 0,
        }
    }

    /// Creates a world at its target enemy population with seeded pickups.
    pub fn populated(config: GameConfig, seed: u64) -> Self {
        let mut world = World::new(config, seed);
        for _ in 0..world.config.max_enemies {
            world.spawn_enemy();
        }
        for _ in 0..world.config.initial_resources {
            world.seed_resource();
        }
        info!(
            "World ready: {} enemies, {} resources",
            world.enemies.len(),
            world.resources.len()
        );
        world
    }

    /// Simulation time in milliseconds, advanced only by [`World::advance_clock`].
    pub fn now_ms(&self) -> u64 {
        self.clock_us / 1000
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn advance_clock(&mut self, dt: Duration) {
        self.clock_us += dt.as_micros() as u64;
        self.tick += 1;
    }

    pub fn random_safe_position(&mut self) -> Vector2 {
        let min = self.config.safe_zone_min();
        let max = self.config.safe_zone_max();
        Vector2::new(self.rng.gen_range(min..max), self.rng.gen_range(min..max))
    }

    pub fn is_in_safe_zone(&self, position: &Vector2) -> bool {
        let min = self.config.safe_zone_min();
        let max = self.config.safe_zone_max();
        position.x >= min && position.x <= max && position.y >= min && position.y <= max
    }

    pub fn clamp(&self, position: Vector2) -> Vector2 {
        clamp_to_world(position, self.config.world_size)
    }

    /// Spawns an enemy at a random safe-zone position.
    pub fn spawn_enemy(&mut self) -> EnemyId {
        let position = self.random_safe_position();
        let level = self.rng.gen_range(1..=self.config.enemy_max_level);
        self.spawn_enemy_at(position, level)
    }

    pub fn spawn_enemy_at(&mut self, position: Vector2, level: u32) -> EnemyId {
        let id = self.enemies.allocate_id();
        let enemy = Enemy::new(id, self.clamp(position), self.config.enemy_max_health, level);
        self.enemies.insert(id, enemy);
        debug!("Enemy {} spawned (level {})", id, level);
        id
    }

    pub fn alive_enemy_count(&self) -> usize {
        self.enemies.values().filter(|e| e.is_alive()).count()
    }

    /// Places an untyped pickup somewhere in the safe zone.
    pub fn seed_resource(&mut self) -> u32 {
        let position = self.random_safe_position();
        self.add_resource(position, None, None)
    }

    pub fn add_resource(
        &mut self,
        position: Vector2,
        kind: Option<ResourceKind>,
        amount: Option<u32>,
    ) -> u32 {
        let id = self.resources.allocate_id();
        let position = self.clamp(position);
        self.resources.insert(
            id,
            ResourcePickup {
                id,
                position,
                kind,
                amount,
            },
        );
        id
    }

    /// Rolls the drop table for an enemy of `level` dying at `at` and
    /// returns one `resourceDropped` event per created pickup. At least one
    /// pickup is always produced.
    pub fn drop_loot(&mut self, at: Vector2, level: u32) -> Vec<ServerEvent> {
        let mut drops = Vec::new();
        for (kind, chance) in DROP_TABLE {
            if self.rng.gen_bool(chance) {
                let roll: f32 = self.rng.gen();
                let amount = (roll * level as f32 * 2.0).ceil().max(1.0) as u32;
                drops.push((kind, amount));
            }
        }
        if drops.is_empty() {
            drops.push((ResourceKind::Iron, 1));
        }

        let jitter = self.config.drop_jitter;
        let mut events = Vec::with_capacity(drops.len());
        for (kind, amount) in drops {
            let offset = Vector2::new(
                (self.rng.gen::<f32>() - 0.5) * jitter,
                (self.rng.gen::<f32>() - 0.5) * jitter,
            );
            let id = self.add_resource(at.add(&offset), Some(kind), Some(amount));
            if let Some(pickup) = self.resources.get(id) {
                events.push(ServerEvent::ResourceDropped(pickup.to_view()));
            }
        }
        events
    }

    /// Creates the player for a freshly admitted connection.
    pub fn add_player(&mut self, id: PlayerId, identity: Identity, weapon_bonus: f32) -> PlayerView {
        let position = self.random_safe_position();
        let mut player = Player::new(
            id,
            identity.user_id,
            identity.username,
            position,
            self.config.player_max_health,
        );
        player.weapon_bonus = weapon_bonus;
        info!(
            "Added player {} ({}) at ({:.0}, {:.0})",
            id, player.username, position.x, position.y
        );
        let view = player.to_view();
        self.players.insert(id, player);
        view
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let removed = self.players.remove(id);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    pub fn init_event(&self, player_id: PlayerId) -> ServerEvent {
        ServerEvent::Init {
            player_id,
            world_size: self.config.world_size,
            border_thickness: self.config.border_thickness,
            players: self.players.values().map(Player::to_view).collect(),
            enemies: self.enemies.values().map(Enemy::to_view).collect(),
            resources: self.resources.values().map(ResourcePickup::to_view).collect(),
        }
    }

    pub fn snapshot(&self) -> ServerEvent {
        ServerEvent::GameState {
            tick: self.tick,
            players: self.players.values().map(Player::to_view).collect(),
            enemies: self.enemies.values().map(Enemy::to_view).collect(),
        }
    }
}

/// Nearest entity to `from` among `candidates`; ties go to the first seen.
pub fn nearest<'a, T, I>(from: &Vector2, candidates: I) -> Option<(&'a T, f32)>
where
    T: Entity + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut best: Option<(&'a T, f32)> = None;
    for candidate in candidates {
        let distance = from.distance_to(&candidate.position());
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((candidate, distance)),
        }
    }
    best
}
