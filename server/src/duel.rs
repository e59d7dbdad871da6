//! Wagered duels between online players.
//!
//! Issuing a challenge escrows the challenger's stake and accepting it
//! escrows the target's, so neither ledger can spend a stake while the duel
//! is open. Every duel carries an expiry instant; the profile service sweeps
//! lapsed duels once per simulation tick and refunds whatever was staked.

use crate::config::GameConfig;
use crate::error::ActionError;
use crate::persistence::ProfileRecord;
use shared::{DuelView, ResourceCounts};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuelRules {
    /// How long a challenge waits for an answer.
    pub challenge_ttl: Duration,
    /// How long an accepted duel may run before both stakes go back.
    pub max_duration: Duration,
    pub winner_experience: u32,
}

impl Default for DuelRules {
    fn default() -> Self {
        DuelRules::from(&GameConfig::default())
    }
}

impl From<&GameConfig> for DuelRules {
    fn from(config: &GameConfig) -> Self {
        Self {
            challenge_ttl: Duration::from_secs(config.duel_challenge_secs),
            max_duration: Duration::from_secs(config.duel_max_secs),
            winner_experience: config.duel_winner_experience,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duelist {
    pub user_id: String,
    pub username: String,
    pub session_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelStage {
    /// Challenger's stake is escrowed, waiting for the target
    Pending,
    /// Both stakes are escrowed
    Active,
}

#[derive(Debug, Clone)]
pub struct Duel {
    pub id: u32,
    pub challenger: Duelist,
    pub target: Duelist,
    pub wager: ResourceCounts,
    pub stage: DuelStage,
    pub expires_at: Instant,
}

impl Duel {
    pub fn involves(&self, user_id: &str) -> bool {
        self.challenger.user_id == user_id || self.target.user_id == user_id
    }

    pub fn opponent(&self, user_id: &str) -> Option<&Duelist> {
        if self.challenger.user_id == user_id {
            Some(&self.target)
        } else if self.target.user_id == user_id {
            Some(&self.challenger)
        } else {
            None
        }
    }

    pub fn to_view(&self, now: Instant) -> DuelView {
        DuelView {
            id: self.id,
            challenger_id: self.challenger.session_id,
            challenger_name: self.challenger.username.clone(),
            target_id: self.target.session_id,
            target_name: self.target.username.clone(),
            wager: self.wager.clone(),
            expires_in_ms: self.expires_at.saturating_duration_since(now).as_millis() as u64,
        }
    }
}

/// Open challenges and running duels.
#[derive(Debug, Default)]
pub struct DuelBoard {
    duels: BTreeMap<u32, Duel>,
    next_duel_id: u32,
    rules: DuelRules,
}

impl DuelBoard {
    pub fn new(rules: DuelRules) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    pub fn rules(&self) -> DuelRules {
        self.rules
    }

    pub fn get(&self, duel_id: u32) -> Option<&Duel> {
        self.duels.get(&duel_id)
    }

    pub fn len(&self) -> usize {
        self.duels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.duels.is_empty()
    }

    fn is_busy(&self, user_id: &str) -> bool {
        self.duels.values().any(|duel| duel.involves(user_id))
    }

    /// Opens a challenge and escrows the challenger's stake. Zero amounts
    /// are dropped from the wager.
    pub fn challenge(
        &mut self,
        challenger: &mut ProfileRecord,
        challenger_session: u32,
        target: Duelist,
        wager: ResourceCounts,
        now: Instant,
    ) -> Result<Duel, ActionError> {
        if target.user_id == challenger.user_id {
            return Err(ActionError::SelfDuel);
        }
        let wager: ResourceCounts = wager.into_iter().filter(|(_, amount)| *amount > 0).collect();
        if wager.is_empty() {
            return Err(ActionError::EmptyWager);
        }
        if self.is_busy(&challenger.user_id) || self.is_busy(&target.user_id) {
            return Err(ActionError::DuelBusy);
        }
        if !challenger.can_afford(&wager) {
            return Err(ActionError::WagerNotCovered);
        }
        stake(challenger, &wager);

        self.next_duel_id += 1;
        let duel = Duel {
            id: self.next_duel_id,
            challenger: Duelist {
                user_id: challenger.user_id.clone(),
                username: challenger.username.clone(),
                session_id: challenger_session,
            },
            target,
            wager,
            stage: DuelStage::Pending,
            expires_at: now + self.rules.challenge_ttl,
        };
        self.duels.insert(duel.id, duel.clone());
        Ok(duel)
    }

    /// Starts a pending duel addressed to `target` and escrows its stake.
    /// A challenge past its expiry counts as gone even before the sweep.
    pub fn accept(
        &mut self,
        target: &mut ProfileRecord,
        duel_id: u32,
        now: Instant,
    ) -> Result<Duel, ActionError> {
        let max_duration = self.rules.max_duration;
        let duel = self
            .duels
            .get_mut(&duel_id)
            .filter(|d| d.stage == DuelStage::Pending)
            .filter(|d| d.target.user_id == target.user_id && now < d.expires_at)
            .ok_or(ActionError::ChallengeNotFound)?;
        if !target.can_afford(&duel.wager) {
            return Err(ActionError::WagerNotCovered);
        }
        stake(target, &duel.wager);
        duel.stage = DuelStage::Active;
        duel.expires_at = now + max_duration;
        Ok(duel.clone())
    }

    /// Removes a pending duel on behalf of its target. The caller refunds
    /// the challenger.
    pub fn decline(&mut self, target_user_id: &str, duel_id: u32) -> Result<Duel, ActionError> {
        match self.duels.get(&duel_id) {
            Some(duel) if duel.stage == DuelStage::Pending && duel.target.user_id == target_user_id => {}
            _ => return Err(ActionError::ChallengeNotFound),
        }
        self.duels.remove(&duel_id).ok_or(ActionError::ChallengeNotFound)
    }

    /// Closes a running duel on a concession: the reporter must be a
    /// participant and must name the opponent's session as winner.
    pub fn complete(
        &mut self,
        reporter_user_id: &str,
        duel_id: u32,
        winner_session: u32,
    ) -> Result<Duel, ActionError> {
        let duel = self
            .duels
            .get(&duel_id)
            .filter(|d| d.stage == DuelStage::Active)
            .ok_or(ActionError::DuelNotFound)?;
        let opponent = duel
            .opponent(reporter_user_id)
            .ok_or(ActionError::DuelNotFound)?;
        if opponent.session_id != winner_session {
            return Err(ActionError::ResultNotAccepted);
        }
        self.duels.remove(&duel_id).ok_or(ActionError::DuelNotFound)
    }

    /// Points the duels of `user_id` at a new session after a reconnect.
    pub fn rebind(&mut self, user_id: &str, session_id: u32) {
        for duel in self.duels.values_mut() {
            for duelist in [&mut duel.challenger, &mut duel.target] {
                if duelist.user_id == user_id {
                    duelist.session_id = session_id;
                }
            }
        }
    }

    /// Removes every duel whose expiry has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<Duel> {
        let lapsed: Vec<u32> = self
            .duels
            .values()
            .filter(|duel| duel.expires_at <= now)
            .map(|duel| duel.id)
            .collect();
        lapsed
            .into_iter()
            .filter_map(|id| self.duels.remove(&id))
            .collect()
    }

    /// Removes the pending challenges `user_id` sent or received.
    pub fn withdraw_pending(&mut self, user_id: &str) -> Vec<Duel> {
        let pending: Vec<u32> = self
            .duels
            .values()
            .filter(|duel| duel.stage == DuelStage::Pending && duel.involves(user_id))
            .map(|duel| duel.id)
            .collect();
        pending
            .into_iter()
            .filter_map(|id| self.duels.remove(&id))
            .collect()
    }
}

fn stake(record: &mut ProfileRecord, wager: &ResourceCounts) {
    for (kind, amount) in wager {
        record.withdraw(*kind, *amount);
    }
}

pub fn refund(record: &mut ProfileRecord, wager: &ResourceCounts) {
    for (kind, amount) in wager {
        record.deposit(*kind, *amount);
    }
}

/// Pays both escrowed stakes to the winner and records the result.
pub fn settle(winner: &mut ProfileRecord, loser: &mut ProfileRecord, wager: &ResourceCounts) {
    for (kind, amount) in wager {
        winner.deposit(*kind, amount.saturating_mul(2));
    }
    winner.duels_won += 1;
    loser.duels_lost += 1;
}
