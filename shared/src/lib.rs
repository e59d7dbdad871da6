//! Types shared by the SwordForge server and its clients: the JSON wire
//! protocol and the 2D math used by every distance check.

pub mod math;
pub mod protocol;

pub use math::{angle_between, clamp_to_world, distance, in_world, Vector2};
pub use protocol::{
    ActionReply, ClientIntent, DuelView, EnemyBehavior, EnemyView, OnlinePlayer, PlayerView,
    ProgressView, ProjectileView, ResourceCounts, ResourceKind, ResourceView, ServerEvent,
    TradeOffer, WeaponView,
};
