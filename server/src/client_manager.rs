//! Session bookkeeping for connected clients.
//!
//! This module handles the server-side view of every admitted connection:
//! - Session lifecycle (admit, disconnect, idle timeout)
//! - Capacity enforcement
//! - Event fan-out to one, all, or all-but-one sessions
//!
//! A session is admitted before its profile has loaded and only joins the
//! broadcast audience once its player exists, so nobody receives world
//! traffic ahead of their `init`.
//!
//! Each session owns the sending half of its connection's bounded outbound
//! queue. Frames are serialized once per broadcast and cloned per recipient.
//! A session whose queue is full is reported like one whose writer is gone,
//! so a client that stops reading is dropped instead of buffering snapshots
//! without limit.

use crate::world::Identity;
use log::{error, info, warn};
use shared::{OnlinePlayer, ServerEvent};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

/// Frames a session may have queued before it counts as stalled.
pub const OUTBOUND_QUEUE: usize = 256;

/// Who receives an outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Only(u32),
    AllExcept(u32),
}

/// An admitted, authenticated connection.
#[derive(Debug)]
pub struct Client {
    /// Session id, also the id of the player entity
    pub id: u32,
    pub identity: Identity,
    pub addr: SocketAddr,
    /// Last time any frame arrived from this client
    pub last_seen: Instant,
    /// Set once the player entity exists
    pub joined: bool,
    outbound: Sender<String>,
}

impl Client {
    pub fn new(
        id: u32,
        identity: Identity,
        addr: SocketAddr,
        outbound: Sender<String>,
    ) -> Self {
        Self {
            id,
            identity,
            addr,
            last_seen: Instant::now(),
            joined: false,
            outbound,
        }
    }

    /// Checks if the client has been silent for longer than `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Queues a pre-serialized frame without waiting. Returns false when
    /// the writer task is gone or has fallen a full queue behind.
    pub fn send_frame(&self, frame: String) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue of client {} is full", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Outbound queue of client {} is closed", self.id);
                false
            }
        }
    }
}

/// Owns every live session, keyed by session id.
pub struct ClientManager {
    clients: BTreeMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty roster. Session ids start from 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Admits a connection.
    ///
    /// Returns the new session id, or None when the server is full.
    pub fn add_client(
        &mut self,
        identity: Identity,
        addr: SocketAddr,
        outbound: Sender<String>,
    ) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!(
            "Client {} ({}) connected from {}",
            client_id, identity.username, addr
        );
        let client = Client::new(client_id, identity, addr, outbound);
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a session. Returns it if it was still present.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let removed = self.clients.remove(client_id);
        if let Some(client) = &removed {
            info!("Client {} ({}) disconnected", client.id, client.identity.username);
        }
        removed
    }

    /// Adds an admitted session to the broadcast audience.
    pub fn mark_joined(&mut self, client_id: u32) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.joined = true;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Refreshes the idle timer of a session.
    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    /// Lists the sessions that have been idle for longer than `timeout`.
    ///
    /// The sessions are not removed here: the caller runs the regular
    /// disconnect path for each of them.
    pub fn timed_out(&self, timeout: Duration) -> Vec<u32> {
        self.clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.id)
            .collect()
    }

    /// Serializes `event` once and queues it for every matching session.
    /// Broadcasts skip sessions that have not joined yet.
    ///
    /// Returns the ids whose writer has gone away or stalled.
    pub fn send(&self, recipient: Recipient, event: &ServerEvent) -> Vec<u32> {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize {}: {}", event.name(), e);
                return Vec::new();
            }
        };

        let mut closed = Vec::new();
        for client in self.clients.values() {
            let wanted = match recipient {
                Recipient::All => client.joined,
                Recipient::Only(id) => client.id == id,
                Recipient::AllExcept(id) => client.joined && client.id != id,
            };
            if wanted && !client.send_frame(frame.clone()) {
                closed.push(client.id);
            }
        }
        closed
    }

    pub fn online_players(&self) -> Vec<OnlinePlayer> {
        self.clients
            .values()
            .filter(|client| client.joined)
            .map(|client| OnlinePlayer {
                id: client.id,
                username: client.identity.username.clone(),
            })
            .collect()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.clients.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{channel, Receiver};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn identity(name: &str) -> Identity {
        Identity {
            user_id: format!("id-{}", name),
            username: name.to_string(),
        }
    }

    fn admit(manager: &mut ClientManager, name: &str) -> (u32, Receiver<String>) {
        let (tx, rx) = channel(OUTBOUND_QUEUE);
        let id = manager.add_client(identity(name), test_addr(), tx).unwrap();
        assert!(manager.mark_joined(id));
        (id, rx)
    }

    fn drain(rx: &mut Receiver<String>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);
        let (first, _rx1) = admit(&mut manager, "ada");
        let (second, _rx2) = admit(&mut manager, "bob");

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.get(2).unwrap().identity.username, "bob");
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        let (_id, _rx) = admit(&mut manager, "ada");

        let (tx, _rx2) = channel(OUTBOUND_QUEUE);
        assert!(manager.add_client(identity("bob"), test_addr(), tx).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let (id, _rx) = admit(&mut manager, "ada");

        let removed = manager.remove_client(&id).unwrap();
        assert_eq!(removed.identity.username, "ada");
        assert!(manager.is_empty());
        assert!(manager.remove_client(&id).is_none());
    }

    #[test]
    fn test_ids_not_reused() {
        let mut manager = ClientManager::new(2);
        let (first, _rx1) = admit(&mut manager, "ada");
        manager.remove_client(&first);
        let (second, _rx2) = admit(&mut manager, "ada");
        assert_ne!(first, second);
    }

    #[test]
    fn test_client_timeout() {
        let mut manager = ClientManager::new(2);
        let (stale, _rx1) = admit(&mut manager, "ada");
        let (fresh, _rx2) = admit(&mut manager, "bob");

        manager.clients.get_mut(&stale).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);
        assert_eq!(manager.timed_out(Duration::from_secs(5)), vec![stale]);

        manager.touch(stale);
        assert!(manager.timed_out(Duration::from_secs(5)).is_empty());
        assert!(manager.get(fresh).is_some());
    }

    #[test]
    fn test_send_routes_by_recipient() {
        let mut manager = ClientManager::new(3);
        let (a, mut rx_a) = admit(&mut manager, "ada");
        let (_b, mut rx_b) = admit(&mut manager, "bob");
        let event = ServerEvent::PlayerLeft { player_id: 9 };

        manager.send(Recipient::All, &event);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);

        manager.send(Recipient::Only(a), &event);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert!(drain(&mut rx_b).is_empty());

        manager.send(Recipient::AllExcept(a), &event);
        assert!(drain(&mut rx_a).is_empty());
        let frames = drain(&mut rx_b);
        assert_eq!(frames, vec![r#"{"event":"playerLeft","data":{"playerId":9}}"#]);
    }

    #[test]
    fn test_pending_session_only_gets_direct_frames() {
        let mut manager = ClientManager::new(3);
        let (_a, mut rx_a) = admit(&mut manager, "ada");
        let (tx, mut rx_pending) = channel(OUTBOUND_QUEUE);
        let pending = manager.add_client(identity("bob"), test_addr(), tx).unwrap();

        manager.send(Recipient::All, &ServerEvent::EnemyRemoved { enemy_id: 3 });
        assert!(drain(&mut rx_pending).is_empty());
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(manager.online_players().len(), 1);

        manager.send(Recipient::Only(pending), &ServerEvent::EnemyRemoved { enemy_id: 3 });
        assert_eq!(drain(&mut rx_pending).len(), 1);

        manager.mark_joined(pending);
        assert_eq!(manager.online_players().len(), 2);
        assert!(!manager.mark_joined(99));
    }

    #[test]
    fn test_send_reports_closed_writers() {
        let mut manager = ClientManager::new(2);
        let (a, rx_a) = admit(&mut manager, "ada");
        let (_b, _rx_b) = admit(&mut manager, "bob");
        drop(rx_a);

        let closed = manager.send(Recipient::All, &ServerEvent::EnemyRemoved { enemy_id: 1 });
        assert_eq!(closed, vec![a]);
    }

    #[test]
    fn test_send_reports_stalled_readers() {
        let mut manager = ClientManager::new(2);
        let (tx, mut rx_slow) = channel(2);
        let slow = manager.add_client(identity("ada"), test_addr(), tx).unwrap();
        manager.mark_joined(slow);
        let (_fast, mut rx_fast) = admit(&mut manager, "bob");

        let event = ServerEvent::EnemyRemoved { enemy_id: 1 };
        assert!(manager.send(Recipient::All, &event).is_empty());
        assert!(manager.send(Recipient::All, &event).is_empty());
        assert_eq!(manager.send(Recipient::All, &event), vec![slow]);

        // The queue never grows past its bound.
        assert_eq!(drain(&mut rx_slow).len(), 2);
        assert_eq!(drain(&mut rx_fast).len(), 3);
    }

    #[test]
    fn test_online_players_in_join_order() {
        let mut manager = ClientManager::new(3);
        let (_a, _rx_a) = admit(&mut manager, "ada");
        let (_b, _rx_b) = admit(&mut manager, "bob");

        let online = manager.online_players();
        let names: Vec<_> = online.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["ada", "bob"]);
        assert_eq!(manager.ids(), vec![1, 2]);
    }
}
