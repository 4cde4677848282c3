//! Event dispatch between connections and the game core.
//!
//! `GameService` is the one place that knows which reply each inbound event
//! produces and who hears about each state change. It holds no socket: the
//! network layer feeds it decoded frames and it answers through the notifier.

use crate::config::GameConfig;
use crate::connections::{Connection, ConnectionManager, Outbox, Refusal};
use crate::error::GameError;
use crate::matchmaker::{JoinOutcome, Matchmaker};
use crate::notifier::Notifier;
use crate::registry::SessionRegistry;
use crate::resolver::{Action, ActionReport, ActionResolver, TerminalCheck};
use log::{debug, info, warn};
use shared::{
    ActionAck, ActionRequest, ClientEvent, InitData, MatchCreated, MatchList, MatchStatus,
    ServerEvent, StateUpdate, TurnChange,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

pub struct GameService {
    registry: Arc<SessionRegistry>,
    matchmaker: Matchmaker,
    resolver: ActionResolver,
    connections: Arc<RwLock<ConnectionManager>>,
    notifier: Notifier,
}

impl GameService {
    pub fn new(config: &GameConfig, max_connections: usize) -> Self {
        Self::with_resolver(
            config,
            max_connections,
            ActionResolver::new(config.action_points_per_turn),
        )
    }

    /// Builds a service whose matches end when `terminal` says so.
    pub fn with_terminal_check(
        config: &GameConfig,
        max_connections: usize,
        terminal: Arc<dyn TerminalCheck>,
    ) -> Self {
        let resolver = ActionResolver::with_terminal_check(config.action_points_per_turn, terminal);
        Self::with_resolver(config, max_connections, resolver)
    }

    fn with_resolver(config: &GameConfig, max_connections: usize, resolver: ActionResolver) -> Self {
        let registry = Arc::new(SessionRegistry::new(config));
        let connections = Arc::new(RwLock::new(ConnectionManager::new(max_connections)));

        Self {
            matchmaker: Matchmaker::new(Arc::clone(&registry), config.clone()),
            notifier: Notifier::new(Arc::clone(&connections)),
            registry,
            resolver,
            connections,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn connect(
        &self,
        identity: &str,
        name: &str,
        addr: SocketAddr,
        outbox: Outbox,
    ) -> Result<u32, Refusal> {
        self.connections
            .write()
            .await
            .add_connection(identity, name, addr, outbox)
    }

    /// Cleans up after a connection ends. A player with no live connection
    /// left is taken out of any match that has not started yet.
    ///
    /// `connection_id` guards against a late cleanup from an older
    /// connection tearing down a newer one with the same identity.
    pub async fn disconnect(&self, identity: &str, connection_id: u32) {
        let still_connected = {
            let mut connections = self.connections.write().await;
            connections.remove_connection(identity, connection_id);
            connections.contains(identity)
        };
        if !still_connected {
            self.release_seat(identity).await;
        }
    }

    /// Frees the player's seat in a waiting match. Seats in matches that
    /// are already being played are kept.
    async fn release_seat(&self, identity: &str) {
        let Some(match_id) = self.registry.find_match_of(identity).await else {
            return;
        };
        let left = self
            .registry
            .mutate(&match_id, |game| Ok(game.remove_waiting_player(identity)))
            .await;
        match left {
            Ok(true) => info!("Freed seat of {} in waiting match {}", identity, match_id),
            Ok(false) => debug!("{} stays in match {} while offline", identity, match_id),
            Err(e) => debug!("Disconnect cleanup for {} skipped: {}", identity, e),
        }
    }

    /// Records inbound activity, including websocket pings and pongs, so
    /// the connection is not evicted as idle.
    pub async fn touch(&self, identity: &str) {
        self.connections.write().await.touch(identity);
    }

    /// Handles one inbound text frame. Failures are reported to the sender
    /// as `error` events; the connection stays open.
    pub async fn handle_text(&self, identity: &str, name: &str, text: &str) {
        self.touch(identity).await;

        let result = match ClientEvent::decode(text) {
            Ok(event) => self.handle_event(identity, name, event).await,
            Err(e) => Err(GameError::from(e)),
        };

        if let Err(e) = result {
            debug!("Rejected request from {}: {}", identity, e);
            self.notifier.send_to(identity, &e.to_event()).await;
        }
    }

    /// Binary frames carry no protocol; the sender gets a `BadRequest`.
    pub async fn handle_binary(&self, identity: &str) {
        self.touch(identity).await;
        let error = GameError::BadRequest("binary frames are not supported".to_string());
        self.notifier.send_to(identity, &error.to_event()).await;
    }

    pub async fn handle_event(
        &self,
        identity: &str,
        name: &str,
        event: ClientEvent,
    ) -> Result<(), GameError> {
        debug!("{} from {}", event.event_name(), identity);

        match event {
            ClientEvent::MatchmakingRequest => {
                let outcome = self.matchmaker.join(identity, name).await?;
                self.announce_join(identity, &outcome).await;
            }
            ClientEvent::JoinMatch(request) => {
                let outcome = self
                    .matchmaker
                    .join_match(&request.match_id, identity, name)
                    .await?;
                self.announce_join(identity, &outcome).await;
            }
            ClientEvent::InitDataRequest => {
                let match_id = self.current_match(identity).await?;
                let game = self.registry.get(&match_id).await?;
                let event = ServerEvent::InitDataResponse(InitData {
                    match_id,
                    state: game.snapshot(),
                    my_player_id: identity.to_string(),
                });
                self.notifier.send_to(identity, &event).await;
            }
            ClientEvent::EndTurn => {
                let match_id = self.current_match(identity).await?;
                self.submit(identity, &match_id, Action::EndTurn).await?;
            }
            ClientEvent::SubmitAction(request) => {
                self.submit_request(identity, request).await?;
            }
            ClientEvent::ListMatches(filter) => {
                let matches = self.registry.list(filter.status).await;
                let event = ServerEvent::MatchList(MatchList { matches });
                self.notifier.send_to(identity, &event).await;
            }
            ClientEvent::CreateMatch => {
                let match_id = self.registry.create().await;
                let event = ServerEvent::MatchCreated(MatchCreated { match_id });
                self.notifier.send_to(identity, &event).await;
            }
        }

        Ok(())
    }

    async fn submit_request(&self, identity: &str, request: ActionRequest) -> Result<(), GameError> {
        let action = Action::from_request(&request)?;
        if request
            .player_id
            .as_deref()
            .is_some_and(|claimed| claimed != identity)
        {
            debug!("Ignoring claimed player id from {}", identity);
        }

        let match_id = match request.game_id {
            Some(match_id) => match_id,
            None => self.current_match(identity).await?,
        };
        self.submit(identity, &match_id, action).await
    }

    async fn submit(&self, identity: &str, match_id: &str, action: Action) -> Result<(), GameError> {
        let action_name = action.name();
        let report = self
            .resolver
            .submit(&self.registry, match_id, identity, action)
            .await?;

        let ack = ServerEvent::ActionResult(ActionAck {
            action: action_name.to_string(),
            message: report.outcome.describe(),
        });
        self.notifier.send_to(identity, &ack).await;
        self.publish(match_id, &report).await;

        Ok(())
    }

    /// Sends the new state to everyone in the match, plus the turn change
    /// when the action rotated the turn.
    async fn publish(&self, match_id: &str, report: &ActionReport) {
        let update = ServerEvent::LobbyState(StateUpdate {
            match_id: match_id.to_string(),
            state: report.snapshot.clone(),
        });
        self.notifier.broadcast(&report.players, &update).await;

        if let Some(rotation) = report.outcome.rotation() {
            self.announce_turn(match_id, report, &rotation.current_player)
                .await;
        }
        if report.finished {
            info!("Match {} reached a terminal state", match_id);
        }
    }

    async fn announce_turn(&self, match_id: &str, report: &ActionReport, current_player: &str) {
        let event = ServerEvent::TurnChanged(TurnChange {
            match_id: match_id.to_string(),
            current_player_id: current_player.to_string(),
            turn: report.snapshot.turn,
            state: report.snapshot.clone(),
        });
        self.notifier.broadcast(&report.players, &event).await;
    }

    async fn announce_join(&self, identity: &str, outcome: &JoinOutcome) {
        let game = &outcome.game;

        if outcome.started {
            for player in game.players() {
                if let Some(info) = game.lobby_info(player) {
                    self.notifier
                        .send_to(player, &ServerEvent::LobbyReady(info))
                        .await;
                }
            }
            return;
        }

        let Some(info) = game.lobby_info(identity) else {
            warn!("{} missing from match {} after joining", identity, outcome.match_id);
            return;
        };
        let event = if game.status() == MatchStatus::WaitingForPlayers {
            ServerEvent::LobbyCreated(info)
        } else {
            ServerEvent::LobbyReady(info)
        };
        self.notifier.send_to(identity, &event).await;
    }

    /// The match an action or data request without a `gameId` refers to.
    /// Finished matches count, so late actions are rejected as `WrongTurn`.
    async fn current_match(&self, identity: &str) -> Result<String, GameError> {
        self.registry
            .latest_match_of(identity)
            .await
            .ok_or_else(|| GameError::MatchNotFound(format!("for {}", identity)))
    }

    /// Ends every turn that has run longer than `timeout`. Zero disables.
    pub async fn expire_stalled_turns(&self, timeout: Duration) -> usize {
        if timeout.is_zero() {
            return 0;
        }

        let mut expired = 0;
        for match_id in self.registry.in_progress_matches().await {
            match self
                .resolver
                .expire_turn(&self.registry, &match_id, timeout)
                .await
            {
                Ok(Some(report)) => {
                    expired += 1;
                    if let Some(rotation) = report.outcome.rotation() {
                        info!(
                            "Turn of {} in match {} expired",
                            rotation.previous_player, match_id
                        );
                        self.announce_turn(&match_id, &report, &rotation.current_player)
                            .await;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Turn expiry for match {} skipped: {}", match_id, e),
            }
        }
        expired
    }

    /// Drops connections idle for longer than `timeout`, runs the same seat
    /// cleanup as a disconnect and asks their writer tasks to close the
    /// socket. Zero disables.
    ///
    /// The cleanup does not wait for the peer: a client that stopped reading
    /// loses its waiting seat even if its socket never finishes closing.
    pub async fn evict_idle(&self, timeout: Duration) -> Vec<Connection> {
        if timeout.is_zero() {
            return Vec::new();
        }

        let evicted = self.connections.write().await.check_timeouts(timeout);
        for connection in &evicted {
            if connection.outbox.try_send(Message::Close(None)).is_err() {
                debug!("Could not queue close frame for {}", connection.identity);
            }
            // A newer connection under the same identity keeps the seat
            let reconnected = self.connections.read().await.contains(&connection.identity);
            if !reconnected {
                self.release_seat(&connection.identity).await;
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{JoinRequest, ListFilter, Position};
    use tokio::sync::mpsc;

    fn addr() -> SocketAddr {
        "127.0.0.1:9100".parse().unwrap()
    }

    async fn connect(service: &GameService, identity: &str) -> (u32, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(32);
        let id = service.connect(identity, identity, addr(), tx).await.unwrap();
        (id, rx)
    }

    fn next_event(rx: &mut mpsc::Receiver<Message>) -> ServerEvent {
        match rx.try_recv() {
            Ok(Message::Text(text)) => ServerEvent::decode(&text).unwrap(),
            other => panic!("Expected a text frame, got {:?}", other),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            events.push(ServerEvent::decode(&text).unwrap());
        }
        events
    }

    async fn paired(service: &GameService) -> (mpsc::Receiver<Message>, mpsc::Receiver<Message>) {
        let (_, mut rx1) = connect(service, "p1").await;
        let (_, mut rx2) = connect(service, "p2").await;
        service
            .handle_event("p1", "p1", ClientEvent::MatchmakingRequest)
            .await
            .unwrap();
        service
            .handle_event("p2", "p2", ClientEvent::MatchmakingRequest)
            .await
            .unwrap();
        drain(&mut rx1);
        drain(&mut rx2);
        (rx1, rx2)
    }

    fn move_request(x: i32, y: i32) -> ClientEvent {
        ClientEvent::SubmitAction(ActionRequest {
            action_type: "Move".to_string(),
            target_position: Some(Position::new(x, y)),
            ..ActionRequest::default()
        })
    }

    #[tokio::test]
    async fn test_matchmaking_replies() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (_, mut rx1) = connect(&service, "p1").await;
        let (_, mut rx2) = connect(&service, "p2").await;

        service
            .handle_event("p1", "p1", ClientEvent::MatchmakingRequest)
            .await
            .unwrap();
        match next_event(&mut rx1) {
            ServerEvent::LobbyCreated(info) => {
                assert_eq!(info.my_player_id, "p1");
                assert_eq!(info.players.len(), 1);
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        service
            .handle_event("p2", "p2", ClientEvent::MatchmakingRequest)
            .await
            .unwrap();
        for (rx, me) in [(&mut rx1, "p1"), (&mut rx2, "p2")] {
            match next_event(rx) {
                ServerEvent::LobbyReady(info) => {
                    assert_eq!(info.my_player_id, me);
                    assert_eq!(info.players.len(), 2);
                    assert_eq!(info.current_player_id.as_deref(), Some("p1"));
                }
                other => panic!("Unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_action_broadcasts_state() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (mut rx1, mut rx2) = paired(&service).await;

        service.handle_event("p1", "p1", move_request(1, 0)).await.unwrap();

        let mine = drain(&mut rx1);
        assert!(matches!(&mine[0], ServerEvent::ActionResult(ack) if ack.action == "Move"));
        assert!(matches!(&mine[1], ServerEvent::LobbyState(update)
            if update.state.players[0].position == Position::new(1, 0)));

        let theirs = drain(&mut rx2);
        assert_eq!(theirs.len(), 1);
        assert!(matches!(&theirs[0], ServerEvent::LobbyState(_)));
    }

    #[tokio::test]
    async fn test_end_turn_announces_rotation() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (mut rx1, mut rx2) = paired(&service).await;

        service
            .handle_event("p1", "p1", ClientEvent::EndTurn)
            .await
            .unwrap();

        for rx in [&mut rx1, &mut rx2] {
            let turn_change = drain(rx).into_iter().find_map(|event| match event {
                ServerEvent::TurnChanged(change) => Some(change),
                _ => None,
            });
            let change = turn_change.unwrap();
            assert_eq!(change.current_player_id, "p2");
            assert_eq!(change.turn, 0);
        }
    }

    #[tokio::test]
    async fn test_errors_reach_only_the_sender() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (mut rx1, mut rx2) = paired(&service).await;

        let text = ClientEvent::EndTurn.encode().unwrap();
        service.handle_text("p2", "p2", &text).await;

        match next_event(&mut rx2) {
            ServerEvent::Error(payload) => {
                assert_eq!(payload.code, "WrongTurn");
                assert_eq!(payload.status, 400);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(drain(&mut rx1).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_bad_requests() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (_, mut rx) = connect(&service, "p1").await;

        for text in ["not json", r#"{"eventName":"dance","data":{}}"#] {
            service.handle_text("p1", "p1", text).await;
            match next_event(&mut rx) {
                ServerEvent::Error(payload) => assert_eq!(payload.code, "BadRequest"),
                other => panic!("Unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_action_type() {
        let service = GameService::new(&GameConfig::default(), 8);
        let _rx = paired(&service).await;

        let event = ClientEvent::SubmitAction(ActionRequest {
            action_type: "Teleport".to_string(),
            ..ActionRequest::default()
        });
        assert_eq!(
            service.handle_event("p1", "p1", event).await,
            Err(GameError::InvalidActionType("Teleport".to_string()))
        );
    }

    #[tokio::test]
    async fn test_init_data_request() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (_, mut rx) = connect(&service, "loner").await;

        let missing = service
            .handle_event("loner", "loner", ClientEvent::InitDataRequest)
            .await;
        assert!(matches!(missing, Err(GameError::MatchNotFound(_))));

        let (mut rx1, _rx2) = paired(&service).await;
        service
            .handle_event("p1", "p1", ClientEvent::InitDataRequest)
            .await
            .unwrap();
        match next_event(&mut rx1) {
            ServerEvent::InitDataResponse(data) => {
                assert_eq!(data.my_player_id, "p1");
                assert_eq!(data.state.players.len(), 2);
                assert_eq!(data.state.grid.width, 10);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_create_list_and_join() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (_, mut rx) = connect(&service, "p1").await;

        service
            .handle_event("p1", "p1", ClientEvent::CreateMatch)
            .await
            .unwrap();
        let match_id = match next_event(&mut rx) {
            ServerEvent::MatchCreated(created) => created.match_id,
            other => panic!("Unexpected event: {:?}", other),
        };

        service
            .handle_event(
                "p1",
                "p1",
                ClientEvent::ListMatches(ListFilter {
                    status: Some(MatchStatus::WaitingForPlayers),
                }),
            )
            .await
            .unwrap();
        match next_event(&mut rx) {
            ServerEvent::MatchList(list) => {
                assert_eq!(list.matches.len(), 1);
                assert_eq!(list.matches[0].id, match_id);
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        service
            .handle_event(
                "p1",
                "p1",
                ClientEvent::JoinMatch(JoinRequest {
                    match_id: match_id.clone(),
                }),
            )
            .await
            .unwrap();
        assert!(matches!(next_event(&mut rx), ServerEvent::LobbyCreated(info) if info.match_id == match_id));
    }

    #[tokio::test]
    async fn test_disconnect_frees_waiting_seat() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (id, _rx) = connect(&service, "p1").await;
        service
            .handle_event("p1", "p1", ClientEvent::MatchmakingRequest)
            .await
            .unwrap();
        let match_id = service.registry().find_match_of("p1").await.unwrap();

        service.disconnect("p1", id).await;

        assert_eq!(service.connection_count().await, 0);
        let game = service.registry().get(&match_id).await.unwrap();
        assert_eq!(game.player_count(), 0);
        assert_eq!(game.status(), MatchStatus::WaitingForPlayers);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_started_match() {
        let service = GameService::new(&GameConfig::default(), 8);
        let _rx = paired(&service).await;
        let match_id = service.registry().find_match_of("p2").await.unwrap();

        // p2's connection id is 2: p1 connected first
        service.disconnect("p2", 2).await;

        let game = service.registry().get(&match_id).await.unwrap();
        assert_eq!(game.player_count(), 2);
        assert_eq!(game.status(), MatchStatus::InProgress);
        assert_eq!(
            service.registry().find_match_of("p2").await,
            Some(match_id)
        );
    }

    #[tokio::test]
    async fn test_stalled_turn_expires() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (mut rx1, mut rx2) = paired(&service).await;

        assert_eq!(service.expire_stalled_turns(Duration::ZERO).await, 0);
        assert_eq!(
            service.expire_stalled_turns(Duration::from_secs(3600)).await,
            0
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            service.expire_stalled_turns(Duration::from_millis(5)).await,
            1
        );

        for rx in [&mut rx1, &mut rx2] {
            match next_event(rx) {
                ServerEvent::TurnChanged(change) => assert_eq!(change.current_player_id, "p2"),
                other => panic!("Unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_idle_connections_are_evicted() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (_, mut rx) = connect(&service, "p1").await;

        assert!(service.evict_idle(Duration::ZERO).await.is_empty());
        assert!(service.evict_idle(Duration::from_secs(3600)).await.is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let evicted = service.evict_idle(Duration::from_millis(5)).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(service.connection_count().await, 0);
        assert!(matches!(rx.try_recv(), Ok(Message::Close(None))));
    }

    #[tokio::test]
    async fn test_eviction_frees_waiting_seat() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (_, _silent_rx) = connect(&service, "ghost").await;
        service
            .handle_event("ghost", "ghost", ClientEvent::MatchmakingRequest)
            .await
            .unwrap();
        let match_id = service.registry().find_match_of("ghost").await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(service.evict_idle(Duration::from_millis(5)).await.len(), 1);

        assert_eq!(service.registry().find_match_of("ghost").await, None);
        assert_eq!(service.registry().get(&match_id).await.unwrap().player_count(), 0);

        // The next joiner waits for a real opponent instead of being paired
        let (_, mut rx) = connect(&service, "bob").await;
        service
            .handle_event("bob", "bob", ClientEvent::MatchmakingRequest)
            .await
            .unwrap();
        match next_event(&mut rx) {
            ServerEvent::LobbyCreated(info) => {
                assert_eq!(info.players.len(), 1);
                assert_eq!(info.players[0].id, "bob");
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(service.registry().in_progress_matches().await.is_empty());
    }

    #[tokio::test]
    async fn test_eviction_keeps_started_match() {
        let service = GameService::new(&GameConfig::default(), 8);
        let _rx = paired(&service).await;
        let match_id = service.registry().find_match_of("p1").await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(service.evict_idle(Duration::from_millis(5)).await.len(), 2);

        let game = service.registry().get(&match_id).await.unwrap();
        assert_eq!(game.status(), MatchStatus::InProgress);
        assert_eq!(game.player_count(), 2);
    }

    #[tokio::test]
    async fn test_touch_keeps_connection_alive() {
        let service = GameService::new(&GameConfig::default(), 8);
        let (_, _rx) = connect(&service, "p1").await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        service.touch("p1").await;
        assert!(service.evict_idle(Duration::from_millis(20)).await.is_empty());
        assert_eq!(service.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_terminal_check_finishes_match() {
        let always = |_: &crate::game::Match| true;
        let service = GameService::with_terminal_check(&GameConfig::default(), 8, Arc::new(always));
        let _rx = paired(&service).await;
        let match_id = service.registry().find_match_of("p1").await.unwrap();

        service.handle_event("p1", "p1", move_request(1, 0)).await.unwrap();

        let game = service.registry().get(&match_id).await.unwrap();
        assert_eq!(game.status(), MatchStatus::Finished);
        assert_eq!(
            service.handle_event("p1", "p1", ClientEvent::EndTurn).await,
            Err(GameError::WrongTurn)
        );
        assert_eq!(
            service.handle_event("p1", "p1", move_request(2, 0)).await,
            Err(GameError::WrongTurn)
        );
        assert_eq!(
            service.handle_event("p2", "p2", ClientEvent::EndTurn).await,
            Err(GameError::WrongTurn)
        );
    }

    #[tokio::test]
    async fn test_finished_players_can_matchmake_again() {
        let always = |_: &crate::game::Match| true;
        let service = GameService::with_terminal_check(&GameConfig::default(), 8, Arc::new(always));
        let (mut rx1, _rx2) = paired(&service).await;
        let finished = service.registry().find_match_of("p1").await.unwrap();
        service.handle_event("p1", "p1", move_request(1, 0)).await.unwrap();
        drain(&mut rx1);

        service
            .handle_event("p1", "p1", ClientEvent::MatchmakingRequest)
            .await
            .unwrap();
        match next_event(&mut rx1) {
            ServerEvent::LobbyCreated(info) => assert_ne!(info.match_id, finished),
            other => panic!("Unexpected event: {:?}", other),
        }
    }
}
