//! Crafting, equipment, the resource market, duels and experience.
//!
//! All profile mutation funnels through one [`ProfileService`] running on a
//! blocking thread, so two requests touching the same ledger never
//! interleave. The simulation loop talks to it through a
//! [`ProfileHandle`] and never waits on storage inside a tick: the only
//! awaited request is the profile load done by a connection task before its
//! player exists.

use crate::duel::{self, Duel, DuelBoard, DuelRules, DuelStage, Duelist};
use crate::error::ActionError;
use crate::persistence::{ProfileRecord, ProfileStore};
use log::{debug, info, warn};
use shared::{
    ActionReply, ClientIntent, ResourceKind, ServerEvent, TradeOffer, WeaponView,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Experience granted per collected pickup.
pub const PICKUP_EXPERIENCE: u32 = 10;
/// Iron spent to restore a weapon's durability.
pub const REPAIR_COST: u32 = 5;

#[derive(Debug)]
pub struct Recipe {
    pub key: &'static str,
    pub name: &'static str,
    pub tier: &'static str,
    pub requirements: &'static [(ResourceKind, u32)],
    pub min_level: u32,
    pub attack_bonus: f32,
    pub durability: u32,
    pub experience: u32,
}

pub const RECIPES: [Recipe; 4] = [
    Recipe {
        key: "BASIC_SWORD",
        name: "Basic Iron Sword",
        tier: "BASIC",
        requirements: &[(ResourceKind::Iron, 5), (ResourceKind::Wood, 2)],
        min_level: 1,
        attack_bonus: 5.0,
        durability: 100,
        experience: 50,
    },
    Recipe {
        key: "REFINED_SWORD",
        name: "Refined Steel Sword",
        tier: "REFINED",
        requirements: &[
            (ResourceKind::Steel, 8),
            (ResourceKind::Iron, 10),
            (ResourceKind::Wood, 3),
        ],
        min_level: 5,
        attack_bonus: 15.0,
        durability: 200,
        experience: 150,
    },
    Recipe {
        key: "ENHANCED_SWORD",
        name: "Enhanced Crystal Sword",
        tier: "ENHANCED",
        requirements: &[
            (ResourceKind::Crystal, 3),
            (ResourceKind::Steel, 15),
            (ResourceKind::Stone, 10),
        ],
        min_level: 10,
        attack_bonus: 30.0,
        durability: 350,
        experience: 400,
    },
    Recipe {
        key: "MASTERWORK_SWORD",
        name: "Masterwork Mythril Sword",
        tier: "MASTERWORK",
        requirements: &[
            (ResourceKind::Mythril, 5),
            (ResourceKind::Crystal, 8),
            (ResourceKind::Steel, 20),
        ],
        min_level: 20,
        attack_bonus: 50.0,
        durability: 500,
        experience: 1000,
    },
];

pub fn recipe(key: &str) -> Option<&'static Recipe> {
    RECIPES.iter().find(|r| r.key == key)
}

/// Experience needed to advance past `level`.
pub fn required_experience(level: u32) -> u32 {
    level * 100 + level * level * 50
}

/// Adds experience and applies every level-up it pays for. Returns true if
/// the level changed.
pub fn grant_experience(record: &mut ProfileRecord, amount: u32) -> bool {
    record.experience += amount;
    let mut leveled = false;
    while record.experience >= required_experience(record.level) {
        record.experience -= required_experience(record.level);
        record.level += 1;
        leveled = true;
    }
    if leveled {
        info!("{} reached level {}", record.username, record.level);
    }
    leveled
}

/// Forges `recipe_key` from the profile's ledger.
///
/// Returns the new weapon and whether the forge caused a level-up. The
/// weapon is equipped when nothing else is.
pub fn craft(record: &mut ProfileRecord, recipe_key: &str) -> Result<(WeaponView, bool), ActionError> {
    let recipe = recipe(recipe_key).ok_or(ActionError::InvalidRecipe)?;
    if record.level < recipe.min_level {
        return Err(ActionError::LevelTooLow(recipe.min_level));
    }
    if recipe
        .requirements
        .iter()
        .any(|(kind, amount)| record.balance(*kind) < *amount)
    {
        return Err(ActionError::InsufficientResources);
    }
    for (kind, amount) in recipe.requirements {
        record.withdraw(*kind, *amount);
    }

    record.total_forges += 1;
    let weapon = WeaponView {
        id: format!("sword_{}", record.total_forges),
        recipe_key: recipe.key.to_string(),
        name: recipe.name.to_string(),
        tier: recipe.tier.to_string(),
        attack_bonus: recipe.attack_bonus,
        durability: recipe.durability,
        max_durability: recipe.durability,
    };
    record.inventory.push(weapon.clone());
    if record.equipped_weapon.is_none() {
        record.equipped_weapon = Some(weapon.id.clone());
    }
    let leveled = grant_experience(record, recipe.experience);
    Ok((weapon, leveled))
}

/// Equips an owned weapon and returns its attack bonus.
pub fn equip(record: &mut ProfileRecord, weapon_id: &str) -> Result<f32, ActionError> {
    let bonus = record
        .weapon(weapon_id)
        .map(|w| w.attack_bonus)
        .ok_or(ActionError::SwordNotFound)?;
    record.equipped_weapon = Some(weapon_id.to_string());
    Ok(bonus)
}

pub fn repair(record: &mut ProfileRecord, weapon_id: &str) -> Result<WeaponView, ActionError> {
    if record.weapon(weapon_id).is_none() {
        return Err(ActionError::SwordNotFound);
    }
    if !record.withdraw(ResourceKind::Iron, REPAIR_COST) {
        return Err(ActionError::RepairCost(REPAIR_COST));
    }
    let weapon = record
        .inventory
        .iter_mut()
        .find(|w| w.id == weapon_id)
        .ok_or(ActionError::SwordNotFound)?;
    weapon.durability = weapon.max_durability;
    Ok(weapon.clone())
}

/// Open sell offers. Offered resources sit in escrow, outside any ledger,
/// until the offer is bought or cancelled.
#[derive(Debug, Default)]
pub struct Market {
    offers: BTreeMap<u32, TradeOffer>,
    next_offer_id: u32,
}

impl Market {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offers(&self) -> Vec<TradeOffer> {
        self.offers.values().cloned().collect()
    }

    pub fn get(&self, offer_id: u32) -> Option<&TradeOffer> {
        self.offers.get(&offer_id)
    }

    pub fn create(
        &mut self,
        seller: &mut ProfileRecord,
        kind: ResourceKind,
        amount: u32,
        price_per_unit: u32,
    ) -> Result<TradeOffer, ActionError> {
        if amount == 0 {
            return Err(ActionError::InvalidAmount);
        }
        let total_price = amount
            .checked_mul(price_per_unit)
            .ok_or(ActionError::InvalidAmount)?;
        if !seller.withdraw(kind, amount) {
            return Err(ActionError::InsufficientResources);
        }

        self.next_offer_id += 1;
        let id = self.next_offer_id;
        let offer = TradeOffer {
            id,
            seller_id: seller.user_id.clone(),
            seller_name: seller.username.clone(),
            resource_type: kind,
            amount,
            price_per_unit,
            total_price,
        };
        self.offers.insert(id, offer.clone());
        Ok(offer)
    }

    /// Checks that `buyer` may take `offer_id`, without changing anything.
    pub fn check_purchase(&self, buyer: &ProfileRecord, offer_id: u32) -> Result<&TradeOffer, ActionError> {
        let offer = self.offers.get(&offer_id).ok_or(ActionError::OfferNotAvailable)?;
        if offer.seller_id == buyer.user_id {
            return Err(ActionError::OwnOffer);
        }
        if buyer.balance(ResourceKind::Iron) < offer.total_price {
            return Err(ActionError::NotEnoughIron);
        }
        Ok(offer)
    }

    /// Settles a purchase: iron moves from buyer to seller and the escrowed
    /// resources go to the buyer.
    pub fn settle(
        &mut self,
        buyer: &mut ProfileRecord,
        seller: &mut ProfileRecord,
        offer_id: u32,
    ) -> Result<TradeOffer, ActionError> {
        self.check_purchase(buyer, offer_id)?;
        let offer = self
            .offers
            .remove(&offer_id)
            .ok_or(ActionError::OfferNotAvailable)?;
        buyer.withdraw(ResourceKind::Iron, offer.total_price);
        buyer.deposit(offer.resource_type, offer.amount);
        seller.deposit(ResourceKind::Iron, offer.total_price);
        Ok(offer)
    }

    /// Withdraws an offer and refunds the escrow to its seller.
    pub fn cancel(&mut self, seller: &mut ProfileRecord, offer_id: u32) -> Result<TradeOffer, ActionError> {
        match self.offers.get(&offer_id) {
            Some(offer) if offer.seller_id == seller.user_id => {}
            _ => return Err(ActionError::CannotCancel),
        }
        let offer = self
            .offers
            .remove(&offer_id)
            .ok_or(ActionError::CannotCancel)?;
        seller.deposit(offer.resource_type, offer.amount);
        Ok(offer)
    }
}

/// Profile state handed to a connection when it is admitted.
#[derive(Debug, Clone)]
pub struct LoadedProfile {
    pub record: ProfileRecord,
    pub offers: Vec<TradeOffer>,
}

#[derive(Debug)]
pub enum ProfileRequest {
    Load {
        session_id: u32,
        user_id: String,
        username: String,
        reply: oneshot::Sender<LoadedProfile>,
    },
    /// Credits one pickup collected in the world.
    CreditPickup {
        user_id: String,
        kind: ResourceKind,
        amount: u32,
    },
    /// Sent on disconnect.
    EndSession {
        session_id: u32,
        user_id: String,
    },
    Action {
        session_id: u32,
        user_id: String,
        intent: ClientIntent,
    },
    /// Sent every simulation tick.
    ExpireDuels,
    /// Answered once every earlier request has been handled.
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// Output of the service, delivered by the simulation loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressionEvent {
    Send { session_id: u32, event: ServerEvent },
    Broadcast(ServerEvent),
    WeaponBonus { session_id: u32, bonus: f32 },
}

/// Cheap, cloneable sending side of the service.
#[derive(Debug, Clone)]
pub struct ProfileHandle {
    tx: UnboundedSender<ProfileRequest>,
}

impl ProfileHandle {
    /// Loads (or creates) the profile of a user joining as `session_id`.
    /// Returns None if the service has stopped.
    pub async fn load(&self, session_id: u32, user_id: &str, username: &str) -> Option<LoadedProfile> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ProfileRequest::Load {
                session_id,
                user_id: user_id.to_string(),
                username: username.to_string(),
                reply,
            })
            .ok()?;
        rx.await.ok()
    }

    pub fn credit_pickup(&self, user_id: &str, kind: ResourceKind, amount: u32) {
        let request = ProfileRequest::CreditPickup {
            user_id: user_id.to_string(),
            kind,
            amount,
        };
        if self.tx.send(request).is_err() {
            warn!("Profile service gone; pickup of {} not saved", user_id);
        }
    }

    pub fn end_session(&self, session_id: u32, user_id: &str) {
        let request = ProfileRequest::EndSession {
            session_id,
            user_id: user_id.to_string(),
        };
        if self.tx.send(request).is_err() {
            warn!("Profile service gone; session {} of {} not closed", session_id, user_id);
        }
    }

    pub fn submit(&self, session_id: u32, user_id: &str, intent: ClientIntent) {
        let request = ProfileRequest::Action {
            session_id,
            user_id: user_id.to_string(),
            intent,
        };
        if self.tx.send(request).is_err() {
            warn!("Profile service gone; dropping request from {}", user_id);
        }
    }

    pub fn expire_duels(&self) {
        if self.tx.send(ProfileRequest::ExpireDuels).is_err() {
            debug!("Profile service gone; duel sweep skipped");
        }
    }

    /// Waits until every request sent before this call has been handled
    /// and written to the store. Returns false if the service has stopped.
    pub async fn flush(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ProfileRequest::Flush { reply }).is_err() {
            return false;
        }
        rx.await.is_ok()
    }
}

/// Single writer for every profile, the market and the duel board.
///
/// Records are cached after first load and the cache is authoritative: a
/// failed store write is logged and the next save of that profile carries
/// the change again.
pub struct ProfileService {
    store: Box<dyn ProfileStore>,
    records: HashMap<String, ProfileRecord>,
    /// user id -> session id of the users currently online
    sessions: HashMap<String, u32>,
    market: Market,
    duels: DuelBoard,
    events: UnboundedSender<ProgressionEvent>,
}

impl ProfileService {
    pub fn new(
        store: Box<dyn ProfileStore>,
        rules: DuelRules,
        events: UnboundedSender<ProgressionEvent>,
    ) -> Self {
        Self {
            store,
            records: HashMap::new(),
            sessions: HashMap::new(),
            market: Market::new(),
            duels: DuelBoard::new(rules),
            events,
        }
    }

    /// Starts the service on a blocking thread.
    pub fn spawn(
        store: Box<dyn ProfileStore>,
        rules: DuelRules,
    ) -> (ProfileHandle, UnboundedReceiver<ProgressionEvent>, JoinHandle<()>) {
        let (tx, rx) = unbounded_channel();
        let (events_tx, events_rx) = unbounded_channel();
        let service = ProfileService::new(store, rules, events_tx);
        let task = tokio::task::spawn_blocking(move || service.run(rx));
        (ProfileHandle { tx }, events_rx, task)
    }

    pub fn run(mut self, mut requests: UnboundedReceiver<ProfileRequest>) {
        info!("Profile service started");
        while let Some(request) = requests.blocking_recv() {
            self.handle(request);
        }
        info!("Profile service stopped");
    }

    pub fn handle(&mut self, request: ProfileRequest) {
        match request {
            ProfileRequest::Load {
                session_id,
                user_id,
                username,
                reply,
            } => {
                let record = self.record(&user_id, &username).clone();
                self.duels.rebind(&user_id, session_id);
                self.sessions.insert(user_id, session_id);
                let loaded = LoadedProfile {
                    record,
                    offers: self.market.offers(),
                };
                if reply.send(loaded).is_err() {
                    debug!("Session {} left before its profile loaded", session_id);
                }
            }
            ProfileRequest::CreditPickup {
                user_id,
                kind,
                amount,
            } => self.credit_pickup(&user_id, kind, amount),
            ProfileRequest::EndSession {
                session_id,
                user_id,
            } => self.end_session(session_id, &user_id),
            ProfileRequest::Action {
                session_id,
                user_id,
                intent,
            } => self.handle_action(session_id, &user_id, intent),
            ProfileRequest::ExpireDuels => self.expire_duels(Instant::now()),
            ProfileRequest::Flush { reply } => {
                if reply.send(()).is_err() {
                    debug!("Flush requester went away");
                }
            }
        }
    }

    /// Cached record of `user_id`, loading it from the store on first use.
    fn record(&mut self, user_id: &str, username: &str) -> &mut ProfileRecord {
        if !self.records.contains_key(user_id) {
            let record = match self.store.load(user_id) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    info!("Creating profile for {}", username);
                    ProfileRecord::new(user_id, username)
                }
                Err(e) => {
                    warn!("Failed to load profile of {}: {}", user_id, e);
                    ProfileRecord::new(user_id, username)
                }
            };
            self.records.insert(user_id.to_string(), record);
        }
        self.records
            .entry(user_id.to_string())
            .or_insert_with(|| ProfileRecord::new(user_id, username))
    }

    fn persist(&mut self, user_id: &str) {
        if let Some(record) = self.records.get(user_id) {
            if let Err(e) = self.store.save(record) {
                warn!("Failed to save profile of {}: {}", user_id, e);
            }
        }
    }

    fn emit(&self, event: ProgressionEvent) {
        if self.events.send(event).is_err() {
            debug!("Simulation loop gone; dropping progression event");
        }
    }

    /// Sends `event` to the current session of `user_id`, if online.
    fn notify(&self, user_id: &str, event: ServerEvent) {
        if let Some(&session_id) = self.sessions.get(user_id) {
            self.emit(ProgressionEvent::Send { session_id, event });
        }
    }

    fn send_progress(&mut self, user_id: &str) {
        if let Some(record) = self.records.get(user_id) {
            self.notify(user_id, ServerEvent::ProgressUpdate(record.to_progress()));
        }
    }

    fn online_user(&self, session_id: u32) -> Option<String> {
        self.sessions
            .iter()
            .find(|(_, id)| **id == session_id)
            .map(|(user_id, _)| user_id.clone())
    }

    fn credit_pickup(&mut self, user_id: &str, kind: ResourceKind, amount: u32) {
        let record = self.record(user_id, user_id);
        record.deposit(kind, amount);
        grant_experience(record, PICKUP_EXPERIENCE);
        debug!("{} banked {} {:?}", record.username, amount, kind);
        self.persist(user_id);
        self.send_progress(user_id);
    }

    fn end_session(&mut self, session_id: u32, user_id: &str) {
        if self.sessions.get(user_id) != Some(&session_id) {
            debug!("Session {} of {} already replaced", session_id, user_id);
            return;
        }
        self.sessions.remove(user_id);
        for withdrawn in self.duels.withdraw_pending(user_id) {
            info!("Challenge {} withdrawn: {} left", withdrawn.id, user_id);
            self.release_stakes(&withdrawn);
        }
        self.persist(user_id);
        info!("Session {} of {} ended", session_id, user_id);
    }

    /// Sweeps lapsed duels and refunds their stakes.
    fn expire_duels(&mut self, now: Instant) {
        for lapsed in self.duels.expire(now) {
            info!("Duel {} lapsed", lapsed.id);
            self.release_stakes(&lapsed);
        }
    }

    /// Refunds what a cancelled duel escrowed and tells both sides.
    fn release_stakes(&mut self, cancelled: &Duel) {
        let mut staked = vec![&cancelled.challenger];
        if cancelled.stage == DuelStage::Active {
            staked.push(&cancelled.target);
        }
        for duelist in staked {
            duel::refund(self.record(&duelist.user_id, &duelist.username), &cancelled.wager);
            self.persist(&duelist.user_id);
            self.send_progress(&duelist.user_id);
        }
        let ended = ServerEvent::DuelEnded {
            duel_id: cancelled.id,
            winner_id: None,
        };
        self.notify(&cancelled.challenger.user_id, ended.clone());
        self.notify(&cancelled.target.user_id, ended);
    }

    fn handle_action(&mut self, session_id: u32, user_id: &str, intent: ClientIntent) {
        let Some(request_id) = intent.request_id() else {
            return;
        };
        let result = self.apply_action(session_id, user_id, request_id, &intent);
        let reply = match result {
            Ok(reply) => {
                self.persist(user_id);
                reply
            }
            Err(e) => {
                debug!("Request {} from {} rejected: {}", request_id, user_id, e);
                ActionReply::rejected(request_id, e.to_string())
            }
        };
        let succeeded = reply.success;
        self.emit(ProgressionEvent::Send {
            session_id,
            event: ServerEvent::Reply(reply),
        });
        if succeeded {
            self.send_progress(user_id);
        }
    }

    fn apply_action(
        &mut self,
        session_id: u32,
        user_id: &str,
        request_id: u64,
        intent: &ClientIntent,
    ) -> Result<ActionReply, ActionError> {
        let mut reply = ActionReply::ok(request_id);
        let now = Instant::now();
        match intent {
            ClientIntent::CraftSword { recipe_key, .. } => {
                let record = self.record(user_id, user_id);
                let was_equipped = record.equipped_weapon.is_some();
                let (weapon, leveled) = craft(record, recipe_key)?;
                let bonus = record.weapon_bonus();
                info!("{} forged {}", record.username, weapon.name);
                if !was_equipped {
                    self.emit(ProgressionEvent::WeaponBonus { session_id, bonus });
                }
                reply.weapon = Some(weapon);
                reply.leveled_up = Some(leveled);
            }
            ClientIntent::EquipSword { sword_id, .. } => {
                let bonus = equip(self.record(user_id, user_id), sword_id)?;
                self.emit(ProgressionEvent::WeaponBonus { session_id, bonus });
            }
            ClientIntent::RepairSword { sword_id, .. } => {
                let weapon = repair(self.record(user_id, user_id), sword_id)?;
                reply.weapon = Some(weapon);
            }
            ClientIntent::CreateOffer {
                resource_type,
                amount,
                price_per_unit,
                ..
            } => {
                self.record(user_id, user_id);
                let record = self
                    .records
                    .get_mut(user_id)
                    .ok_or(ActionError::InsufficientResources)?;
                let offer = self
                    .market
                    .create(record, *resource_type, *amount, *price_per_unit)?;
                info!("{} offered {} {:?}", offer.seller_name, offer.amount, offer.resource_type);
                reply.offer = Some(offer);
                self.emit(ProgressionEvent::Broadcast(ServerEvent::ShopOffersUpdate(
                    self.market.offers(),
                )));
            }
            ClientIntent::BuyOffer { offer_id, .. } => {
                let seller_id = self
                    .market
                    .get(*offer_id)
                    .map(|o| o.seller_id.clone())
                    .ok_or(ActionError::OfferNotAvailable)?;
                if seller_id == user_id {
                    return Err(ActionError::OwnOffer);
                }
                // Loads the seller into the cache even while offline.
                self.record(&seller_id, &seller_id);
                self.record(user_id, user_id);
                let mut buyer = self
                    .records
                    .remove(user_id)
                    .ok_or(ActionError::OfferNotAvailable)?;
                let settled = match self.records.get_mut(&seller_id) {
                    Some(seller) => self.market.settle(&mut buyer, seller, *offer_id),
                    None => Err(ActionError::OfferNotAvailable),
                };
                self.records.insert(user_id.to_string(), buyer);
                let offer = settled?;
                info!("Offer {} bought by {}", offer.id, user_id);

                self.persist(&seller_id);
                self.send_progress(&seller_id);
                reply.offer = Some(offer);
                self.emit(ProgressionEvent::Broadcast(ServerEvent::ShopOffersUpdate(
                    self.market.offers(),
                )));
            }
            ClientIntent::CancelOffer { offer_id, .. } => {
                self.record(user_id, user_id);
                let record = self
                    .records
                    .get_mut(user_id)
                    .ok_or(ActionError::CannotCancel)?;
                let offer = self.market.cancel(record, *offer_id)?;
                reply.offer = Some(offer);
                self.emit(ProgressionEvent::Broadcast(ServerEvent::ShopOffersUpdate(
                    self.market.offers(),
                )));
            }
            ClientIntent::ChallengeDuel {
                target_id, wager, ..
            } => {
                let target_user = self
                    .online_user(*target_id)
                    .ok_or(ActionError::PlayerNotOnline)?;
                let target = Duelist {
                    username: self.record(&target_user, &target_user).username.clone(),
                    user_id: target_user,
                    session_id: *target_id,
                };
                self.record(user_id, user_id);
                let record = self
                    .records
                    .get_mut(user_id)
                    .ok_or(ActionError::PlayerNotOnline)?;
                let challenge = self
                    .duels
                    .challenge(record, session_id, target, wager.clone(), now)?;
                info!(
                    "{} challenged {} (duel {})",
                    challenge.challenger.username, challenge.target.username, challenge.id
                );
                let view = challenge.to_view(now);
                self.notify(&challenge.target.user_id, ServerEvent::DuelChallenge(view.clone()));
                reply.duel = Some(view);
            }
            ClientIntent::AcceptDuel { duel_id, .. } => {
                self.record(user_id, user_id);
                let record = self
                    .records
                    .get_mut(user_id)
                    .ok_or(ActionError::ChallengeNotFound)?;
                let started = self.duels.accept(record, *duel_id, now)?;
                info!("Duel {} started", started.id);
                let starting = ServerEvent::DuelStarting { duel_id: started.id };
                self.notify(&started.challenger.user_id, starting.clone());
                self.notify(&started.target.user_id, starting);
                reply.duel = Some(started.to_view(now));
            }
            ClientIntent::DeclineDuel { duel_id, .. } => {
                let declined = self.duels.decline(user_id, *duel_id)?;
                info!("Duel {} declined", declined.id);
                let challenger = &declined.challenger;
                duel::refund(
                    self.record(&challenger.user_id, &challenger.username),
                    &declined.wager,
                );
                self.persist(&challenger.user_id);
                self.send_progress(&challenger.user_id);
                self.notify(
                    &challenger.user_id,
                    ServerEvent::DuelDeclined {
                        duel_id: declined.id,
                        target_name: declined.target.username.clone(),
                    },
                );
            }
            ClientIntent::DuelComplete {
                duel_id, winner_id, ..
            } => {
                let finished = self.duels.complete(user_id, *duel_id, *winner_id)?;
                let winner_user = finished
                    .opponent(user_id)
                    .map(|d| d.user_id.clone())
                    .ok_or(ActionError::DuelNotFound)?;
                let experience = self.duels.rules().winner_experience;
                self.record(&winner_user, &winner_user);
                self.record(user_id, user_id);
                let mut loser = self
                    .records
                    .remove(user_id)
                    .ok_or(ActionError::DuelNotFound)?;
                if let Some(winner) = self.records.get_mut(&winner_user) {
                    duel::settle(winner, &mut loser, &finished.wager);
                    grant_experience(winner, experience);
                    info!("{} won duel {}", winner.username, finished.id);
                }
                self.records.insert(user_id.to_string(), loser);

                self.persist(&winner_user);
                self.send_progress(&winner_user);
                let ended = ServerEvent::DuelEnded {
                    duel_id: finished.id,
                    winner_id: Some(*winner_id),
                };
                self.notify(&finished.challenger.user_id, ended.clone());
                self.notify(&finished.target.user_id, ended);
            }
            _ => return Err(ActionError::InvalidRecipe),
        }
        reply.progress = self.records.get(user_id).map(ProfileRecord::to_progress);
        Ok(reply)
    }
}
