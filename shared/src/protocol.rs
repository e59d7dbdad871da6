//! Wire protocol between the authoritative server and its clients.
//!
//! Every frame is a JSON object of the form `{"event": "<name>", "data": ...}`
//! with camelCase field names. Client intents are fire-and-forget except the
//! progression requests, which carry a `requestId` and are answered with a
//! [`ServerEvent::Reply`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Material kinds dropped by enemies and tracked in resource ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Iron,
    Wood,
    Stone,
    Steel,
    Crystal,
    Mythril,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Iron,
        ResourceKind::Wood,
        ResourceKind::Stone,
        ResourceKind::Steel,
        ResourceKind::Crystal,
        ResourceKind::Mythril,
    ];
}

/// Per-kind resource counters.
pub type ResourceCounts = BTreeMap<ResourceKind, u32>;

/// Behavior label of an enemy's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum EnemyBehavior {
    #[default]
    Wander,
    Chase,
    Attack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: u32,
    pub username: String,
    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub max_health: f32,
    pub facing_angle: f32,
    pub is_alive: bool,
    pub resources: ResourceCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub max_health: f32,
    pub facing_angle: f32,
    pub is_alive: bool,
    pub state: EnemyBehavior,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResourceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileView {
    pub id: u32,
    pub player_id: u32,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlinePlayer {
    pub id: u32,
    pub username: String,
}

/// A forged weapon as shown to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponView {
    pub id: String,
    pub recipe_key: String,
    pub name: String,
    pub tier: String,
    pub attack_bonus: f32,
    pub durability: u32,
    pub max_durability: u32,
}

/// Durable progression state of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub level: u32,
    pub experience: u32,
    pub resources: ResourceCounts,
    pub inventory: Vec<WeaponView>,
    pub equipped_weapon: Option<String>,
    pub total_forges: u32,
    pub duels_won: u32,
    pub duels_lost: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOffer {
    pub id: u32,
    pub seller_id: String,
    pub seller_name: String,
    pub resource_type: ResourceKind,
    pub amount: u32,
    pub price_per_unit: u32,
    pub total_price: u32,
}

/// A duel between two online players. Ids are session ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuelView {
    pub id: u32,
    pub challenger_id: u32,
    pub challenger_name: String,
    pub target_id: u32,
    pub target_name: String,
    /// Resources each side stakes; the winner takes both stakes.
    pub wager: ResourceCounts,
    /// Time left before the duel lapses and the stakes are refunded.
    pub expires_in_ms: u64,
}

/// Answer to a progression request: `{success, reason?, ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActionReply {
    pub request_id: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon: Option<WeaponView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<TradeOffer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leveled_up: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duel: Option<DuelView>,
}

impl ActionReply {
    pub fn ok(request_id: u64) -> Self {
        ActionReply {
            request_id,
            success: true,
            ..Default::default()
        }
    }

    pub fn rejected(request_id: u64, reason: impl Into<String>) -> Self {
        ActionReply {
            request_id,
            success: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Messages sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Init {
        player_id: u32,
        world_size: f32,
        border_thickness: f32,
        players: Vec<PlayerView>,
        enemies: Vec<EnemyView>,
        resources: Vec<ResourceView>,
    },
    GameState {
        tick: u64,
        players: Vec<PlayerView>,
        enemies: Vec<EnemyView>,
    },
    PlayerJoined(PlayerView),
    PlayerLeft {
        player_id: u32,
    },
    PlayerAttacked {
        player_id: u32,
        enemy_id: Option<u32>,
        damage: f32,
        enemy_health: f32,
        enemy_alive: bool,
    },
    EnemyAttack {
        enemy_id: u32,
        target_id: u32,
        damage: f32,
    },
    ResourceDropped(ResourceView),
    ResourceCollected {
        resource_id: u32,
        player_id: u32,
        resource_type: ResourceKind,
        resource_amount: u32,
    },
    EnemySpawned(EnemyView),
    EnemyRemoved {
        enemy_id: u32,
    },
    PlayerRespawned {
        player_id: u32,
        x: f32,
        y: f32,
        health: f32,
    },
    SwordThrown {
        id: u32,
        player_id: u32,
        x: f32,
        y: f32,
        angle: f32,
    },
    SwordUpdate(Vec<ProjectileView>),
    SwordHit {
        sword_id: u32,
        enemy_id: u32,
        damage: f32,
        enemy_health: f32,
        enemy_alive: bool,
    },
    SwordRemoved {
        sword_id: u32,
    },
    ProgressUpdate(ProgressView),
    ShopOffersUpdate(Vec<TradeOffer>),
    OnlinePlayersUpdate(Vec<OnlinePlayer>),
    DuelChallenge(DuelView),
    DuelStarting {
        duel_id: u32,
    },
    DuelDeclined {
        duel_id: u32,
        target_name: String,
    },
    /// `winner_id` is None when the duel lapsed and both stakes went back.
    DuelEnded {
        duel_id: u32,
        winner_id: Option<u32>,
    },
    Reply(ActionReply),
}

impl ServerEvent {
    /// Wire name of the event, as found in the `event` field.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Init { .. } => "init",
            ServerEvent::GameState { .. } => "gameState",
            ServerEvent::PlayerJoined(_) => "playerJoined",
            ServerEvent::PlayerLeft { .. } => "playerLeft",
            ServerEvent::PlayerAttacked { .. } => "playerAttacked",
            ServerEvent::EnemyAttack { .. } => "enemyAttack",
            ServerEvent::ResourceDropped(_) => "resourceDropped",
            ServerEvent::ResourceCollected { .. } => "resourceCollected",
            ServerEvent::EnemySpawned(_) => "enemySpawned",
            ServerEvent::EnemyRemoved { .. } => "enemyRemoved",
            ServerEvent::PlayerRespawned { .. } => "playerRespawned",
            ServerEvent::SwordThrown { .. } => "swordThrown",
            ServerEvent::SwordUpdate(_) => "swordUpdate",
            ServerEvent::SwordHit { .. } => "swordHit",
            ServerEvent::SwordRemoved { .. } => "swordRemoved",
            ServerEvent::ProgressUpdate(_) => "progressUpdate",
            ServerEvent::ShopOffersUpdate(_) => "shopOffersUpdate",
            ServerEvent::OnlinePlayersUpdate(_) => "onlinePlayersUpdate",
            ServerEvent::DuelChallenge(_) => "duelChallenge",
            ServerEvent::DuelStarting { .. } => "duelStarting",
            ServerEvent::DuelDeclined { .. } => "duelDeclined",
            ServerEvent::DuelEnded { .. } => "duelEnded",
            ServerEvent::Reply(_) => "reply",
        }
    }
}

/// Messages sent from clients to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientIntent {
    PlayerMove {
        velocity_x: f32,
        velocity_y: f32,
        facing_angle: f32,
    },
    PlayerAttack,
    ThrowSword {
        angle: f32,
    },
    PlayerDash {
        velocity_x: f32,
        velocity_y: f32,
        damage_boost: f32,
        /// Boost duration in milliseconds.
        duration: u64,
    },
    CollectResource(u32),
    Respawn,

    CraftSword {
        request_id: u64,
        recipe_key: String,
    },
    EquipSword {
        request_id: u64,
        sword_id: String,
    },
    RepairSword {
        request_id: u64,
        sword_id: String,
    },
    CreateOffer {
        request_id: u64,
        resource_type: ResourceKind,
        amount: u32,
        price_per_unit: u32,
    },
    BuyOffer {
        request_id: u64,
        offer_id: u32,
    },
    CancelOffer {
        request_id: u64,
        offer_id: u32,
    },
    ChallengeDuel {
        request_id: u64,
        target_id: u32,
        wager: ResourceCounts,
    },
    AcceptDuel {
        request_id: u64,
        duel_id: u32,
    },
    DeclineDuel {
        request_id: u64,
        duel_id: u32,
    },
    /// Sent by the defeated duelist, naming the opponent as winner.
    DuelComplete {
        request_id: u64,
        duel_id: u32,
        winner_id: u32,
    },
}

impl ClientIntent {
    /// Request id of a progression request, `None` for gameplay intents.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ClientIntent::CraftSword { request_id, .. }
            | ClientIntent::EquipSword { request_id, .. }
            | ClientIntent::RepairSword { request_id, .. }
            | ClientIntent::CreateOffer { request_id, .. }
            | ClientIntent::BuyOffer { request_id, .. }
            | ClientIntent::CancelOffer { request_id, .. }
            | ClientIntent::ChallengeDuel { request_id, .. }
            | ClientIntent::AcceptDuel { request_id, .. }
            | ClientIntent::DeclineDuel { request_id, .. }
            | ClientIntent::DuelComplete { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }

    pub fn is_progression(&self) -> bool {
        self.request_id().is_some()
    }

    /// Rejects payloads carrying NaN or infinite numbers.
    pub fn is_well_formed(&self) -> bool {
        match self {
            ClientIntent::PlayerMove {
                velocity_x,
                velocity_y,
                facing_angle,
            } => velocity_x.is_finite() && velocity_y.is_finite() && facing_angle.is_finite(),
            ClientIntent::ThrowSword { angle } => angle.is_finite(),
            ClientIntent::PlayerDash {
                velocity_x,
                velocity_y,
                damage_boost,
                ..
            } => velocity_x.is_finite() && velocity_y.is_finite() && damage_boost.is_finite(),
            _ => true,
        }
    }
}
