//! Entity store and the simulation records it holds.
//!
//! Storage only: nothing in this module applies game rules beyond keeping
//! health non-negative. Lookups return `Option` so callers can treat a
//! missing id as "already gone".

use shared::{
    EnemyBehavior, EnemyView, PlayerView, ProjectileView, ResourceCounts, ResourceKind,
    ResourceView, Vector2,
};
use std::collections::BTreeMap;

pub type PlayerId = u32;
pub type EnemyId = u32;
pub type ResourceId = u32;
pub type ProjectileId = u32;

/// Common identity + position capability of every simulated entity.
pub trait Entity {
    fn id(&self) -> u32;
    fn position(&self) -> Vector2;
}

/// Keyed storage for one entity kind.
///
/// Iteration follows ascending id order so that every tick walks entities in
/// the same sequence. Ids handed out by [`EntityStore::allocate_id`] are never
/// reused.
#[derive(Debug, Clone)]
pub struct EntityStore<T> {
    entities: BTreeMap<u32, T>,
    next_id: u32,
}

impl<T> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntityStore<T> {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Inserts under an externally assigned id and keeps the allocator ahead
    /// of it.
    pub fn insert(&mut self, id: u32, entity: T) -> Option<T> {
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.entities.insert(id, entity)
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.entities.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<T> {
        self.entities.remove(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.entities.keys().copied().collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entities.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entities.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Health pool shared by players and enemies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vitals {
    pub health: f32,
    pub max_health: f32,
    pub is_alive: bool,
}

impl Vitals {
    pub fn full(max_health: f32) -> Self {
        Self {
            health: max_health,
            max_health,
            is_alive: true,
        }
    }

    /// Applies damage, clamping at zero. Returns true only on the hit that
    /// kills; hits on an already dead pool change nothing.
    pub fn take_damage(&mut self, amount: f32) -> bool {
        if !self.is_alive {
            return false;
        }
        self.health = (self.health - amount).max(0.0);
        if self.health <= 0.0 {
            self.health = 0.0;
            self.is_alive = false;
            return true;
        }
        false
    }

    pub fn restore(&mut self) {
        *self = Vitals::full(self.max_health);
    }
}

/// Temporary damage multiplier granted by a dash.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageBoost {
    pub multiplier: f32,
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub user_id: String,
    pub username: String,
    pub position: Vector2,
    pub velocity: Vector2,
    pub vitals: Vitals,
    pub facing_angle: f32,
    /// Resources gathered this session, shown in snapshots. Each pickup is
    /// also credited to the durable profile as it happens.
    pub resources: ResourceCounts,
    pub last_attack_ms: Option<u64>,
    pub last_throw_ms: Option<u64>,
    pub boost: Option<DamageBoost>,
    pub weapon_bonus: f32,
    /// Melee swing waiting for the next tick.
    pub pending_attack: bool,
}

impl Player {
    pub fn new(
        id: PlayerId,
        user_id: String,
        username: String,
        position: Vector2,
        max_health: f32,
    ) -> Self {
        Self {
            id,
            user_id,
            username,
            position,
            velocity: Vector2::ZERO,
            vitals: Vitals::full(max_health),
            facing_angle: 0.0,
            resources: ResourceCounts::new(),
            last_attack_ms: None,
            last_throw_ms: None,
            boost: None,
            weapon_bonus: 0.0,
            pending_attack: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.vitals.is_alive
    }

    /// Damage multiplier in effect at `now_ms`.
    pub fn damage_multiplier(&self, now_ms: u64) -> f32 {
        match self.boost {
            Some(boost) if now_ms < boost.expires_at_ms => boost.multiplier,
            _ => 1.0,
        }
    }

    pub fn credit(&mut self, kind: ResourceKind, amount: u32) {
        *self.resources.entry(kind).or_insert(0) += amount;
    }

    pub fn to_view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            username: self.username.clone(),
            x: self.position.x,
            y: self.position.y,
            health: self.vitals.health,
            max_health: self.vitals.max_health,
            facing_angle: self.facing_angle,
            is_alive: self.vitals.is_alive,
            resources: self.resources.clone(),
        }
    }
}

impl Entity for Player {
    fn id(&self) -> u32 {
        self.id
    }

    fn position(&self) -> Vector2 {
        self.position
    }
}

#[derive(Debug, Clone)]
pub struct Enemy {
    pub id: EnemyId,
    pub position: Vector2,
    pub velocity: Vector2,
    pub vitals: Vitals,
    pub facing_angle: f32,
    pub state: EnemyBehavior,
    /// Milliseconds until the next wander direction change.
    pub wander_timer_ms: f32,
    pub last_attack_ms: Option<u64>,
    /// Set on death; the corpse stays until the grace window elapses.
    pub death_time_ms: Option<u64>,
    pub level: u32,
}

impl Enemy {
    pub fn new(id: EnemyId, position: Vector2, max_health: f32, level: u32) -> Self {
        Self {
            id,
            position,
            velocity: Vector2::ZERO,
            vitals: Vitals::full(max_health),
            facing_angle: 0.0,
            state: EnemyBehavior::Wander,
            wander_timer_ms: 0.0,
            last_attack_ms: None,
            death_time_ms: None,
            level,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.vitals.is_alive
    }

    /// Applies damage and stamps the death time on the killing hit.
    pub fn take_damage(&mut self, amount: f32, now_ms: u64) -> bool {
        let died = self.vitals.take_damage(amount);
        if died {
            self.death_time_ms = Some(now_ms);
            self.velocity = Vector2::ZERO;
        }
        died
    }

    pub fn to_view(&self) -> EnemyView {
        EnemyView {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            health: self.vitals.health,
            max_health: self.vitals.max_health,
            facing_angle: self.facing_angle,
            is_alive: self.vitals.is_alive,
            state: self.state,
            level: self.level,
        }
    }
}

impl Entity for Enemy {
    fn id(&self) -> u32 {
        self.id
    }

    fn position(&self) -> Vector2 {
        self.position
    }
}

/// Collectable point entity.
#[derive(Debug, Clone)]
pub struct ResourcePickup {
    pub id: ResourceId,
    pub position: Vector2,
    pub kind: Option<ResourceKind>,
    pub amount: Option<u32>,
}

impl ResourcePickup {
    /// Untyped pickups count as one unit of iron.
    pub fn yield_kind(&self) -> ResourceKind {
        self.kind.unwrap_or(ResourceKind::Iron)
    }

    pub fn yield_amount(&self) -> u32 {
        self.amount.unwrap_or(1)
    }

    pub fn to_view(&self) -> ResourceView {
        ResourceView {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            kind: self.kind,
            amount: self.amount,
        }
    }
}

impl Entity for ResourcePickup {
    fn id(&self) -> u32 {
        self.id
    }

    fn position(&self) -> Vector2 {
        self.position
    }
}

/// A thrown sword in flight.
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: ProjectileId,
    /// May outlive the owning player; resolve with `players.get`.
    pub owner_id: PlayerId,
    pub position: Vector2,
    pub velocity: Vector2,
    pub angle: f32,
    pub damage: f32,
    pub traveled: f32,
    pub max_distance: f32,
    pub created_at_ms: u64,
    pub lifetime_ms: u64,
}

impl Projectile {
    pub fn is_spent(&self, now_ms: u64) -> bool {
        self.traveled >= self.max_distance
            || now_ms.saturating_sub(self.created_at_ms) >= self.lifetime_ms
    }

    pub fn to_view(&self) -> ProjectileView {
        ProjectileView {
            id: self.id,
            player_id: self.owner_id,
            x: self.position.x,
            y: self.position.y,
            angle: self.angle,
        }
    }
}

impl Entity for Projectile {
    fn id(&self) -> u32 {
        self.id
    }

    fn position(&self) -> Vector2 {
        self.position
    }
}
