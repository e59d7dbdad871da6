//! Durable per-user profiles.
//!
//! A [`ProfileStore`] reads and writes whole [`ProfileRecord`]s. Only the
//! progression service touches a store, so implementations need no
//! internal locking.

use crate::error::StoreError;
use log::debug;
use serde::{Deserialize, Serialize};
use shared::{ProgressView, ResourceCounts, ResourceKind, WeaponView};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub user_id: String,
    pub username: String,
    pub level: u32,
    pub experience: u32,
    pub resources: ResourceCounts,
    pub inventory: Vec<WeaponView>,
    pub equipped_weapon: Option<String>,
    pub total_forges: u32,
    pub duels_won: u32,
    pub duels_lost: u32,
}

impl ProfileRecord {
    /// Fresh level 1 profile with an empty ledger.
    pub fn new(user_id: &str, username: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            level: 1,
            experience: 0,
            resources: ResourceCounts::new(),
            inventory: Vec::new(),
            equipped_weapon: None,
            total_forges: 0,
            duels_won: 0,
            duels_lost: 0,
        }
    }

    pub fn balance(&self, kind: ResourceKind) -> u32 {
        self.resources.get(&kind).copied().unwrap_or(0)
    }

    pub fn deposit(&mut self, kind: ResourceKind, amount: u32) {
        *self.resources.entry(kind).or_insert(0) += amount;
    }

    /// Takes `amount` of `kind` out of the ledger. Returns false and leaves
    /// the ledger untouched when the balance is too low.
    pub fn withdraw(&mut self, kind: ResourceKind, amount: u32) -> bool {
        let balance = self.balance(kind);
        if balance < amount {
            return false;
        }
        self.resources.insert(kind, balance - amount);
        true
    }

    /// True when every amount in `counts` is covered by the ledger.
    pub fn can_afford(&self, counts: &ResourceCounts) -> bool {
        counts.iter().all(|(kind, amount)| self.balance(*kind) >= *amount)
    }

    pub fn weapon(&self, id: &str) -> Option<&WeaponView> {
        self.inventory.iter().find(|w| w.id == id)
    }

    /// Attack bonus of the equipped weapon, zero when nothing is equipped.
    pub fn weapon_bonus(&self) -> f32 {
        self.equipped_weapon
            .as_deref()
            .and_then(|id| self.weapon(id))
            .map(|w| w.attack_bonus)
            .unwrap_or(0.0)
    }

    pub fn to_progress(&self) -> ProgressView {
        ProgressView {
            level: self.level,
            experience: self.experience,
            resources: self.resources.clone(),
            inventory: self.inventory.clone(),
            equipped_weapon: self.equipped_weapon.clone(),
            total_forges: self.total_forges,
            duels_won: self.duels_won,
            duels_lost: self.duels_lost,
        }
    }
}

pub trait ProfileStore: Send {
    /// Loads a profile; `Ok(None)` for a user never saved before.
    fn load(&mut self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError>;

    fn save(&mut self, record: &ProfileRecord) -> Result<(), StoreError>;
}

/// Process-lifetime store, used when no data directory is configured.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    records: HashMap<String, ProfileRecord>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&mut self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
        Ok(self.records.get(user_id).cloned())
    }

    fn save(&mut self, record: &ProfileRecord) -> Result<(), StoreError> {
        self.records.insert(record.user_id.clone(), record.clone());
        Ok(())
    }
}

/// One bincode file per user under a directory.
#[derive(Debug)]
pub struct FileProfileStore {
    dir: PathBuf,
}

impl FileProfileStore {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// File name is the lowercase hex of the user id bytes, so distinct ids
    /// never share a file, even on case-insensitive filesystems.
    fn path_for(&self, user_id: &str) -> PathBuf {
        let name: String = user_id.bytes().map(|b| format!("{:02x}", b)).collect();
        self.dir.join(format!("u{}.profile", name))
    }
}

impl ProfileStore for FileProfileStore {
    fn load(&mut self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
        let path = self.path_for(user_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let record = bincode::deserialize(&bytes).map_err(StoreError::Decode)?;
        Ok(Some(record))
    }

    fn save(&mut self, record: &ProfileRecord) -> Result<(), StoreError> {
        let bytes = bincode::serialize(record).map_err(StoreError::Encode)?;
        let path = self.path_for(&record.user_id);
        // Write then rename so a crash never leaves a torn profile.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        debug!("Saved profile of {} to {}", record.user_id, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProfileRecord {
        let mut record = ProfileRecord::new("user/1", "ada");
        record.deposit(ResourceKind::Iron, 12);
        record.inventory.push(WeaponView {
            id: "w1".into(),
            recipe_key: "BASIC_SWORD".into(),
            name: "Basic Sword".into(),
            tier: "basic".into(),
            attack_bonus: 5.0,
            durability: 100,
            max_durability: 100,
        });
        record.equipped_weapon = Some("w1".into());
        record
    }

    #[test]
    fn test_ledger_never_goes_negative() {
        let mut record = ProfileRecord::new("u1", "ada");
        record.deposit(ResourceKind::Wood, 3);
        assert!(!record.withdraw(ResourceKind::Wood, 4));
        assert_eq!(record.balance(ResourceKind::Wood), 3);
        assert!(record.withdraw(ResourceKind::Wood, 3));
        assert_eq!(record.balance(ResourceKind::Wood), 0);
        assert!(!record.withdraw(ResourceKind::Steel, 1));
    }

    #[test]
    fn test_weapon_bonus_follows_equipped() {
        let mut record = sample();
        assert_eq!(record.weapon_bonus(), 5.0);
        record.equipped_weapon = None;
        assert_eq!(record.weapon_bonus(), 0.0);
        record.equipped_weapon = Some("missing".into());
        assert_eq!(record.weapon_bonus(), 0.0);
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryProfileStore::new();
        assert!(store.load("user/1").unwrap().is_none());
        store.save(&sample()).unwrap();
        assert_eq!(store.load("user/1").unwrap(), Some(sample()));
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = std::env::temp_dir().join(format!("swordforge-profiles-{}", std::process::id()));
        let mut store = FileProfileStore::open(&dir).unwrap();
        assert!(store.load("user/1").unwrap().is_none());
        store.save(&sample()).unwrap();

        let mut reopened = FileProfileStore::open(&dir).unwrap();
        let loaded = reopened.load("user/1").unwrap().unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(loaded.to_progress().equipped_weapon.as_deref(), Some("w1"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_store_keeps_similar_ids_apart() {
        let dir = std::env::temp_dir().join(format!("swordforge-ids-{}", std::process::id()));
        let mut store = FileProfileStore::open(&dir).unwrap();

        let mut alice = ProfileRecord::new("team/alice", "alice");
        alice.deposit(ResourceKind::Mythril, 99);
        store.save(&alice).unwrap();

        assert!(store.load("team_alice").unwrap().is_none());
        assert!(store.load("Team/alice").unwrap().is_none());
        store.save(&ProfileRecord::new("team_alice", "impostor")).unwrap();

        let loaded = store.load("team/alice").unwrap().unwrap();
        assert_eq!(loaded.username, "alice");
        assert_eq!(loaded.balance(ResourceKind::Mythril), 99);
        assert_ne!(store.path_for("team/alice"), store.path_for("team_alice"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_store_rejects_corrupt_profile() {
        let dir = std::env::temp_dir().join(format!("swordforge-corrupt-{}", std::process::id()));
        let mut store = FileProfileStore::open(&dir).unwrap();
        std::fs::write(store.path_for("u9"), b"\x01").unwrap();
        assert!(matches!(store.load("u9"), Err(StoreError::Decode(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
