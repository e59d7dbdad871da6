//! Error types of the server crate.

/// Fatal errors raised while bringing the server up.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("profile store error: {0}")]
    Store(#[from] StoreError),

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection refused during the handshake. Terminal for that connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,
}

/// Failures of the durable profile store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("profile I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode profile: {0}")]
    Encode(bincode::Error),

    #[error("failed to decode profile: {0}")]
    Decode(bincode::Error),
}

/// Rejected progression action. The display text is the `reason` sent back
/// to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Invalid recipe")]
    InvalidRecipe,

    #[error("Requires level {0}")]
    LevelTooLow(u32),

    #[error("Insufficient resources")]
    InsufficientResources,

    #[error("Sword not found")]
    SwordNotFound,

    #[error("Not enough iron (need {0})")]
    RepairCost(u32),

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Offer not available")]
    OfferNotAvailable,

    #[error("Cannot buy your own offer")]
    OwnOffer,

    #[error("Not enough Iron")]
    NotEnoughIron,

    #[error("Cannot cancel offer")]
    CannotCancel,

    #[error("Player not online")]
    PlayerNotOnline,

    #[error("Cannot duel yourself")]
    SelfDuel,

    #[error("Wager must include resources")]
    EmptyWager,

    #[error("Insufficient resources for wager")]
    WagerNotCovered,

    #[error("Player is already in a duel")]
    DuelBusy,

    #[error("Challenge not found")]
    ChallengeNotFound,

    #[error("Duel not found")]
    DuelNotFound,

    #[error("Only the defeated duelist can report the result")]
    ResultNotAccepted,
}
