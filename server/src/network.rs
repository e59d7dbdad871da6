//! Server network layer: WebSocket sessions and the simulation loop.
//!
//! Connection tasks only authenticate, parse and forward. Everything that
//! touches the world happens in [`Server::run`], which owns the [`Game`] and
//! the [`ClientManager`] and serializes intents, ticks and timeouts through
//! one `select!`.

use crate::auth::{self, Authenticator};
use crate::client_manager::{ClientManager, Recipient, OUTBOUND_QUEUE};
use crate::config::GameConfig;
use crate::duel::DuelRules;
use crate::error::ServerError;
use crate::game::Game;
use crate::persistence::ProfileStore;
use crate::progression::{LoadedProfile, ProfileHandle, ProfileService, ProgressionEvent};
use crate::world::Identity;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientIntent, ServerEvent};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, Sender, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Longest a single socket write may block before the session is dropped.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages sent from connection tasks to the simulation loop
#[derive(Debug)]
pub enum ServerMessage {
    /// Authenticated connection asking for a session
    Admit {
        identity: Identity,
        addr: SocketAddr,
        outbound: Sender<String>,
        reply: oneshot::Sender<Option<u32>>,
    },
    /// Profile loaded; the player can enter the world
    Join {
        client_id: u32,
        profile: LoadedProfile,
    },
    Intent {
        client_id: u32,
        intent: ClientIntent,
    },
    Heartbeat {
        client_id: u32,
    },
    Disconnected {
        client_id: u32,
    },
}

/// Runtime settings of a server instance.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub tick_rate: u32,
    pub max_clients: usize,
    pub game: GameConfig,
    /// Seed of the world RNG
    pub seed: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            max_clients: 64,
            game: GameConfig::default(),
            seed: 0,
        }
    }
}

/// Main server coordinating sessions and the world simulation
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    game: Game,
    clients: ClientManager,
    authenticator: Arc<dyn Authenticator>,
    profiles: ProfileHandle,
    tick_duration: Duration,
    idle_timeout: Duration,
    ping_interval: Duration,
    /// Sessions whose outbound queue was found closed or full
    stale: Vec<u32>,

    // Communication channels
    server_tx: UnboundedSender<ServerMessage>,
    server_rx: UnboundedReceiver<ServerMessage>,
    progression_rx: UnboundedReceiver<ProgressionEvent>,
}

impl Server {
    /// Binds the listener and starts the profile service.
    pub async fn bind(
        addr: &str,
        settings: ServerSettings,
        authenticator: Arc<dyn Authenticator>,
        store: Box<dyn ProfileStore>,
    ) -> Result<Self, ServerError> {
        settings.game.validate()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on ws://{}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let rules = DuelRules::from(&settings.game);
        let (profiles, progression_rx, _service) = ProfileService::spawn(store, rules);
        let tick_rate = settings.tick_rate.max(1);
        let idle_timeout = Duration::from_secs(settings.game.idle_timeout_secs);
        // Three pings per idle period keep a quiet but healthy client alive.
        let ping_interval = (idle_timeout / 3).max(Duration::from_millis(100));

        Ok(Server {
            listener: Some(listener),
            local_addr,
            game: Game::new(settings.game, settings.seed),
            clients: ClientManager::new(settings.max_clients),
            authenticator,
            profiles,
            tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
            idle_timeout,
            ping_interval,
            stale: Vec::new(),
            server_tx,
            server_rx,
            progression_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the task accepting TCP connections
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let server_tx = self.server_tx.clone();
        let authenticator = Arc::clone(&self.authenticator);
        let profiles = self.profiles.clone();
        let ping_interval = self.ping_interval;

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("TCP connection from {}", addr);
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            Arc::clone(&authenticator),
                            profiles.clone(),
                            server_tx.clone(),
                            ping_interval,
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn send(&mut self, recipient: Recipient, event: &ServerEvent) {
        let closed = self.clients.send(recipient, event);
        self.stale.extend(closed);
    }

    fn broadcast_all(&mut self, events: Vec<ServerEvent>) {
        for event in &events {
            self.send(Recipient::All, event);
        }
    }

    /// Disconnects every session a send found closed or stalled.
    fn drop_stale(&mut self) {
        while let Some(client_id) = self.stale.pop() {
            if self.clients.get(client_id).is_some() {
                info!("Dropping client {}: outbound queue closed or full", client_id);
                self.disconnect(client_id);
            }
        }
    }

    /// Credits every pickup in `events` to the collector's durable profile.
    fn bank_pickups(&self, events: &[ServerEvent]) {
        for event in events {
            let ServerEvent::ResourceCollected {
                player_id,
                resource_type,
                resource_amount,
                ..
            } = event
            else {
                continue;
            };
            match self.game.world.players.get(*player_id) {
                Some(player) => {
                    self.profiles
                        .credit_pickup(&player.user_id, *resource_type, *resource_amount)
                }
                None => warn!("Pickup by unknown player {} not banked", player_id),
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Admit {
                identity,
                addr,
                outbound,
                reply,
            } => {
                let admitted = self.clients.add_client(identity, addr, outbound);
                if admitted.is_none() {
                    warn!("Refusing connection from {}: server full", addr);
                }
                if reply.send(admitted).is_err() {
                    if let Some(client_id) = admitted {
                        self.clients.remove_client(&client_id);
                    }
                }
            }
            ServerMessage::Join { client_id, profile } => self.join(client_id, profile),
            ServerMessage::Intent { client_id, intent } => {
                self.clients.touch(client_id);
                self.handle_intent(client_id, intent);
            }
            ServerMessage::Heartbeat { client_id } => self.clients.touch(client_id),
            ServerMessage::Disconnected { client_id } => self.disconnect(client_id),
        }
    }

    /// Puts an admitted session's player into the world and greets it.
    fn join(&mut self, client_id: u32, profile: LoadedProfile) {
        let Some(identity) = self.clients.get(client_id).map(|c| c.identity.clone()) else {
            debug!("Client {} left before joining", client_id);
            return;
        };
        let weapon_bonus = profile.record.weapon_bonus();
        let view = self.game.add_player(client_id, identity, weapon_bonus);
        self.clients.mark_joined(client_id);

        let init = self.game.world.init_event(client_id);
        self.send(Recipient::Only(client_id), &init);
        self.send(Recipient::AllExcept(client_id), &ServerEvent::PlayerJoined(view));
        self.send(
            Recipient::Only(client_id),
            &ServerEvent::ProgressUpdate(profile.record.to_progress()),
        );
        self.send(
            Recipient::Only(client_id),
            &ServerEvent::ShopOffersUpdate(profile.offers),
        );
        let online = ServerEvent::OnlinePlayersUpdate(self.clients.online_players());
        self.send(Recipient::All, &online);
    }

    fn handle_intent(&mut self, client_id: u32, intent: ClientIntent) {
        if intent.is_progression() {
            match self.clients.get(client_id) {
                Some(client) if client.joined => {
                    self.profiles
                        .submit(client_id, &client.identity.user_id, intent);
                }
                _ => debug!("Ignoring progression request from unjoined client {}", client_id),
            }
            return;
        }
        let events = self.game.apply_intent(client_id, &intent);
        self.bank_pickups(&events);
        self.broadcast_all(events);
    }

    /// Runs the regular leave path. Safe to call for unknown ids.
    fn disconnect(&mut self, client_id: u32) {
        let Some(client) = self.clients.remove_client(&client_id) else {
            return;
        };
        self.game.remove_player(client_id);
        self.profiles.end_session(client_id, &client.identity.user_id);
        if client.joined {
            self.send(Recipient::All, &ServerEvent::PlayerLeft { player_id: client_id });
            let online = ServerEvent::OnlinePlayersUpdate(self.clients.online_players());
            self.send(Recipient::All, &online);
        }
    }

    fn handle_progression(&mut self, event: ProgressionEvent) {
        match event {
            ProgressionEvent::Send { session_id, event } => {
                self.send(Recipient::Only(session_id), &event);
            }
            ProgressionEvent::Broadcast(event) => self.send(Recipient::All, &event),
            ProgressionEvent::WeaponBonus { session_id, bonus } => {
                self.game.set_weapon_bonus(session_id, bonus);
            }
        }
    }

    /// Ends every session and waits until the profile service has written
    /// everything it was sent.
    async fn shutdown(&mut self) {
        for client_id in self.clients.ids() {
            self.disconnect(client_id);
        }
        if self.profiles.flush().await {
            info!("Profiles saved");
        } else {
            warn!("Profile service stopped before shutdown; recent changes may be lost");
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the server until `shutdown` completes, then ends every session
    /// and flushes profiles before returning.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        self.spawn_acceptor();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut timeout_interval = interval(Duration::from_secs(1));
        let mut last_tick = Instant::now();
        tokio::pin!(shutdown);

        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                },

                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                Some(event) = self.progression_rx.recv() => {
                    self.handle_progression(event);
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick);
                    last_tick = now;

                    let events = self.game.tick(dt);
                    self.bank_pickups(&events);
                    self.broadcast_all(events);
                    self.profiles.expire_duels();
                },

                _ = timeout_interval.tick() => {
                    for client_id in self.clients.timed_out(self.idle_timeout) {
                        info!("Client {} timed out", client_id);
                        self.disconnect(client_id);
                    }
                },
            }
            self.drop_stale();
        }

        self.shutdown().await;
        Ok(())
    }
}

fn reject(error: &crate::error::AuthError) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(error.to_string()));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}

/// Drives one connection from handshake to close.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    authenticator: Arc<dyn Authenticator>,
    profiles: ProfileHandle,
    server_tx: UnboundedSender<ServerMessage>,
    ping_interval: Duration,
) {
    let mut identity = None;
    let callback = |request: &Request, response: Response| {
        match auth::authenticate(authenticator.as_ref(), request) {
            Ok(verified) => {
                identity = Some(verified);
                Ok(response)
            }
            Err(e) => {
                warn!("Refusing {}: {}", addr, e);
                Err(reject(&e))
            }
        }
    };
    let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let Some(identity) = identity else {
        return;
    };
    let (mut sink, mut stream) = ws.split();

    let (outbound, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let (reply, admitted) = oneshot::channel();
    let admit = ServerMessage::Admit {
        identity: identity.clone(),
        addr,
        outbound,
        reply,
    };
    if server_tx.send(admit).is_err() {
        return;
    }
    let Ok(Some(client_id)) = admitted.await else {
        let frame = CloseFrame {
            code: CloseCode::Again,
            reason: "Server full".into(),
        };
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            debug!("Failed to close {}: {}", addr, e);
        }
        return;
    };

    // Frames queued before the writer starts wait in the channel. Pings go
    // out on their own schedule so a client with nothing to say still
    // answers with pongs.
    let mut writer = tokio::spawn(async move {
        let mut pings = interval(ping_interval);
        pings.set_missed_tick_behavior(MissedTickBehavior::Delay);
        pings.tick().await;
        loop {
            let message = tokio::select! {
                frame = outbound_rx.recv() => match frame {
                    Some(frame) => Message::Text(frame),
                    None => break,
                },
                _ = pings.tick() => Message::Ping(Vec::new()),
            };
            match timeout(WRITE_TIMEOUT, sink.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Write to client {} failed: {}", client_id, e);
                    break;
                }
                Err(_) => {
                    warn!("Write to client {} timed out", client_id);
                    return;
                }
            }
        }
        match timeout(WRITE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Closing client {} failed: {}", client_id, e),
            Err(_) => debug!("Closing client {} timed out", client_id),
        }
    });

    match profiles
        .load(client_id, &identity.user_id, &identity.username)
        .await
    {
        Some(profile) => {
            if server_tx.send(ServerMessage::Join { client_id, profile }).is_err() {
                return;
            }
        }
        None => {
            error!("Profile service unavailable; dropping client {}", client_id);
            let _ = server_tx.send(ServerMessage::Disconnected { client_id });
            return;
        }
    }

    // The session ends when the client stops talking or the writer gives up.
    let mut writer_done = false;
    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            finished = &mut writer => {
                writer_done = true;
                if let Err(e) = finished {
                    error!("Writer task of client {} panicked: {}", client_id, e);
                }
                break;
            }
        };
        let Some(frame) = frame else {
            break;
        };
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                debug!("Read from client {} failed: {}", client_id, e);
                break;
            }
        };
        let forward = match message {
            Message::Text(text) => match serde_json::from_str::<ClientIntent>(&text) {
                Ok(intent) => ServerMessage::Intent { client_id, intent },
                Err(e) => {
                    warn!("Malformed frame from client {}: {}", client_id, e);
                    continue;
                }
            },
            Message::Ping(_) | Message::Pong(_) => ServerMessage::Heartbeat { client_id },
            Message::Close(_) => break,
            Message::Binary(_) | Message::Frame(_) => continue,
        };
        if server_tx.send(forward).is_err() {
            break;
        }
    }

    let _ = server_tx.send(ServerMessage::Disconnected { client_id });
    if !writer_done {
        if let Err(e) = writer.await {
            error!("Writer task of client {} panicked: {}", client_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenTable;
    use crate::error::StoreError;
    use crate::persistence::MemoryProfileStore;
    use crate::persistence::ProfileRecord;
    use shared::{ActionReply, ResourceKind};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc::Receiver;

    /// Store whose contents stay visible to the test after the server
    /// takes ownership of it.
    #[derive(Clone, Default)]
    struct SharedStore(Arc<Mutex<HashMap<String, ProfileRecord>>>);

    impl ProfileStore for SharedStore {
        fn load(&mut self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
            Ok(self.0.lock().unwrap().get(user_id).cloned())
        }

        fn save(&mut self, record: &ProfileRecord) -> Result<(), StoreError> {
            self.0
                .lock()
                .unwrap()
                .insert(record.user_id.clone(), record.clone());
            Ok(())
        }
    }

    fn quiet_config() -> GameConfig {
        GameConfig {
            max_enemies: 0,
            initial_resources: 0,
            spawn_chance: 0.0,
            ..GameConfig::default()
        }
    }

    async fn server_with(max_clients: usize, store: Box<dyn ProfileStore>) -> Server {
        let settings = ServerSettings {
            max_clients,
            game: quiet_config(),
            ..ServerSettings::default()
        };
        Server::bind("127.0.0.1:0", settings, Arc::new(TokenTable::new()), store)
            .await
            .unwrap()
    }

    async fn test_server(max_clients: usize) -> Server {
        server_with(max_clients, Box::new(MemoryProfileStore::new())).await
    }

    fn identity(name: &str) -> Identity {
        Identity {
            user_id: format!("id-{}", name),
            username: name.to_string(),
        }
    }

    fn admit(server: &mut Server, name: &str) -> (Option<u32>, Receiver<String>) {
        admit_with_queue(server, name, OUTBOUND_QUEUE)
    }

    fn admit_with_queue(
        server: &mut Server,
        name: &str,
        queue: usize,
    ) -> (Option<u32>, Receiver<String>) {
        let (outbound, rx) = mpsc::channel(queue);
        let (reply, mut admitted) = oneshot::channel();
        server.handle_message(ServerMessage::Admit {
            identity: identity(name),
            addr: "127.0.0.1:9000".parse().unwrap(),
            outbound,
            reply,
        });
        (admitted.try_recv().unwrap(), rx)
    }

    fn profile(name: &str) -> LoadedProfile {
        LoadedProfile {
            record: ProfileRecord::new(&format!("id-{}", name), name),
            offers: Vec::new(),
        }
    }

    fn event_names(rx: &mut Receiver<String>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            names.push(value["event"].as_str().unwrap().to_string());
        }
        names
    }

    #[tokio::test]
    async fn test_join_sequence() {
        let mut server = test_server(4).await;
        let (first, mut rx1) = admit(&mut server, "ada");
        let first = first.unwrap();
        server.handle_message(ServerMessage::Join {
            client_id: first,
            profile: profile("ada"),
        });
        assert_eq!(
            event_names(&mut rx1),
            vec!["init", "progressUpdate", "shopOffersUpdate", "onlinePlayersUpdate"]
        );

        let (second, mut rx2) = admit(&mut server, "bob");
        let second = second.unwrap();
        server.handle_message(ServerMessage::Join {
            client_id: second,
            profile: profile("bob"),
        });
        assert_eq!(event_names(&mut rx1), vec!["playerJoined", "onlinePlayersUpdate"]);
        assert_eq!(event_names(&mut rx2).first().map(String::as_str), Some("init"));
        assert_eq!(server.game.world.players.len(), 2);
    }

    #[tokio::test]
    async fn test_admission_respects_capacity() {
        let mut server = test_server(1).await;
        let (first, _rx1) = admit(&mut server, "ada");
        assert!(first.is_some());
        let (second, _rx2) = admit(&mut server, "bob");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_removes_player_and_notifies() {
        let mut server = test_server(4).await;
        let (a, mut rx_a) = admit(&mut server, "ada");
        let (b, _rx_b) = admit(&mut server, "bob");
        let (a, b) = (a.unwrap(), b.unwrap());
        server.handle_message(ServerMessage::Join { client_id: a, profile: profile("ada") });
        server.handle_message(ServerMessage::Join { client_id: b, profile: profile("bob") });
        event_names(&mut rx_a);

        server.handle_message(ServerMessage::Disconnected { client_id: b });
        assert_eq!(event_names(&mut rx_a), vec!["playerLeft", "onlinePlayersUpdate"]);
        assert!(server.game.world.players.get(b).is_none());

        // A second report of the same departure is a no-op.
        server.handle_message(ServerMessage::Disconnected { client_id: b });
        assert!(event_names(&mut rx_a).is_empty());
    }

    async fn next_reply(server: &mut Server) -> ActionReply {
        timeout(Duration::from_secs(5), async {
            loop {
                match server.progression_rx.recv().await {
                    Some(ProgressionEvent::Send {
                        event: ServerEvent::Reply(reply),
                        ..
                    }) => return reply,
                    Some(other) => server.handle_progression(other),
                    None => panic!("profile service stopped"),
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_collected_pickups_fund_crafting() {
        let mut server = test_server(4).await;
        let (a, _rx) = admit(&mut server, "ada");
        let a = a.unwrap();
        let loaded = server.profiles.load(a, "id-ada", "ada").await.unwrap();
        server.handle_message(ServerMessage::Join { client_id: a, profile: loaded });

        let position = server.game.world.players.get(a).unwrap().position;
        let iron = server
            .game
            .world
            .add_resource(position, Some(ResourceKind::Iron), Some(5));
        let wood = server
            .game
            .world
            .add_resource(position, Some(ResourceKind::Wood), Some(2));
        for resource_id in [iron, wood] {
            server.handle_message(ServerMessage::Intent {
                client_id: a,
                intent: ClientIntent::CollectResource(resource_id),
            });
        }
        assert!(server.game.world.resources.is_empty());

        // Pickups are banked as they happen, so the sword is craftable
        // without leaving the world first.
        server.handle_message(ServerMessage::Intent {
            client_id: a,
            intent: ClientIntent::CraftSword {
                request_id: 1,
                recipe_key: "BASIC_SWORD".into(),
            },
        });
        let reply = next_reply(&mut server).await;
        assert!(reply.success, "craft rejected: {:?}", reply.reason);
    }

    #[tokio::test]
    async fn test_shutdown_saves_banked_pickups() {
        let store = SharedStore::default();
        let mut server = server_with(4, Box::new(store.clone())).await;
        let (a, mut rx) = admit(&mut server, "ada");
        let a = a.unwrap();
        let loaded = server.profiles.load(a, "id-ada", "ada").await.unwrap();
        server.handle_message(ServerMessage::Join { client_id: a, profile: loaded });

        let position = server.game.world.players.get(a).unwrap().position;
        let pickup = server
            .game
            .world
            .add_resource(position, Some(ResourceKind::Mythril), Some(3));
        server.handle_message(ServerMessage::Intent {
            client_id: a,
            intent: ClientIntent::CollectResource(pickup),
        });

        let (stop, stopped) = oneshot::channel::<()>();
        let running = tokio::spawn(server.run_until(async {
            let _ = stopped.await;
        }));
        stop.send(()).unwrap();
        timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let saved = store.0.lock().unwrap().get("id-ada").cloned().unwrap();
        assert_eq!(saved.resources.get(&ResourceKind::Mythril), Some(&3));

        // The session was ended, which closes its outbound queue.
        event_names(&mut rx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stalled_client_is_dropped() {
        let mut server = test_server(4).await;
        // Room for exactly the four greeting frames.
        let (a, _rx_a) = admit_with_queue(&mut server, "ada", 4);
        let a = a.unwrap();
        server.handle_message(ServerMessage::Join { client_id: a, profile: profile("ada") });
        server.drop_stale();
        assert!(server.clients.get(a).is_some());

        let (b, mut rx_b) = admit(&mut server, "bob");
        let b = b.unwrap();
        server.handle_message(ServerMessage::Join { client_id: b, profile: profile("bob") });
        event_names(&mut rx_b);

        server.drop_stale();
        assert!(server.clients.get(a).is_none());
        assert!(server.game.world.players.get(a).is_none());
        assert_eq!(event_names(&mut rx_b), vec!["playerLeft", "onlinePlayersUpdate"]);
    }

    #[tokio::test]
    async fn test_intents_reach_the_world() {
        let mut server = test_server(4).await;
        let (a, _rx) = admit(&mut server, "ada");
        let a = a.unwrap();
        server.handle_message(ServerMessage::Join { client_id: a, profile: profile("ada") });
        server.handle_message(ServerMessage::Intent {
            client_id: a,
            intent: ClientIntent::PlayerMove {
                velocity_x: 100.0,
                velocity_y: 0.0,
                facing_angle: 0.0,
            },
        });
        let player = server.game.world.players.get(a).unwrap();
        assert_eq!(player.velocity.x, 100.0);
    }

    #[tokio::test]
    async fn test_weapon_bonus_event_updates_player() {
        let mut server = test_server(4).await;
        let (a, _rx) = admit(&mut server, "ada");
        let a = a.unwrap();
        server.handle_message(ServerMessage::Join { client_id: a, profile: profile("ada") });
        server.handle_progression(ProgressionEvent::WeaponBonus {
            session_id: a,
            bonus: 15.0,
        });
        assert_eq!(server.game.world.players.get(a).unwrap().weapon_bonus, 15.0);
    }
}
