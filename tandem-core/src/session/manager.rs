//! SessionManager: lifecycle and wiring for one peer's session
//!
//! The manager owns one session at a time. Creating or joining writes
//! the session document, registers the compensating disconnect write
//! for the local presence flag, captures watermarks, and only then
//! spawns one consumer task per subscription (moves, actions, chat,
//! opponent presence). Everything observable flows out through a
//! single broadcast channel of [`SessionEvent`].

use std::sync::Arc;

use serde_json::json;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::actions::ActionChannel;
use super::chat::ChatRelay;
use super::moves::MoveSynchronizer;
use super::paths;
use super::presence::PresenceTracker;
use crate::code;
use crate::config::SyncConfig;
use crate::error::{SessionError, StoreError};
use crate::rules::RulesEngine;
use crate::store::SessionStore;
use crate::types::{ActionKind, ChatRecord, Color, Role, SessionDoc, SessionEvent};

struct ActiveSession {
    code: String,
    role: Role,
    moves: Arc<MoveSynchronizer>,
    actions: Arc<ActionChannel>,
    chat: Arc<ChatRelay>,
    presence: Arc<PresenceTracker>,
    tasks: Vec<JoinHandle<()>>,
}

/// Manages one peer's session over a shared store
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    rules: Arc<dyn RulesEngine>,
    config: SyncConfig,
    events: broadcast::Sender<SessionEvent>,
    active: RwLock<Option<ActiveSession>>,
}

impl SessionManager {
    /// Create a manager over a store connection and a rules engine
    pub fn new(store: Arc<dyn SessionStore>, rules: Arc<dyn RulesEngine>, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            store,
            rules,
            config,
            events,
            active: RwLock::new(None),
        }
    }

    /// Subscribe to session events. Subscribe before create/join so no
    /// early event (BoardLoaded, presence) is missed.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Create a session as host (white). Returns the shareable code.
    pub async fn create_session(&self) -> Result<String, SessionError> {
        let mut active = self.active.write().await;
        if let Some(session) = active.as_ref() {
            return Err(SessionError::AlreadyActive(session.code.clone()));
        }

        let session_code = code::generate(self.config.code_length);
        let doc = SessionDoc::new(&session_code, &self.config.starting_position);
        self.store
            .set(
                &paths::session(&session_code),
                serde_json::to_value(&doc).map_err(StoreError::from)?,
            )
            .await?;
        self.store
            .register_on_disconnect(&paths::presence(&session_code, Role::Host), json!(false))
            .await?;

        *active = Some(self.wire(session_code.clone(), Role::Host, 0, 0).await?);
        info!(code = %session_code, "created session as host");
        Ok(session_code)
    }

    /// Join an existing session as guest (black)
    pub async fn join_session(&self, session_code: &str) -> Result<(), SessionError> {
        let mut active = self.active.write().await;
        if let Some(session) = active.as_ref() {
            return Err(SessionError::AlreadyActive(session.code.clone()));
        }

        let doc: SessionDoc = self
            .store
            .get(&paths::session(session_code))
            .await?
            .and_then(|value| serde_json::from_value(value).ok())
            .ok_or_else(|| SessionError::NotFound(session_code.to_string()))?;
        if !doc.host_present {
            return Err(SessionError::NotFound(session_code.to_string()));
        }

        // Watermarks are captured from this read, before the first
        // subscription delivers the full history: everything already
        // in the document is reflected in the loaded board snapshot
        // and must not be re-applied.
        let move_mark = doc.moves.len();
        let action_mark = doc.actions.len();

        self.store
            .set(&paths::presence(session_code, Role::Guest), json!(true))
            .await?;
        self.store
            .register_on_disconnect(&paths::presence(session_code, Role::Guest), json!(false))
            .await?;

        *active = Some(
            self.wire(session_code.to_string(), Role::Guest, move_mark, action_mark)
                .await?,
        );
        info!(code = %session_code, moves = move_mark, "joined session as guest");

        if !doc.moves.is_empty() {
            let _ = self.events.send(SessionEvent::BoardLoaded { board: doc.board });
        }
        Ok(())
    }

    /// Leave the current session: abort consumer tasks, clear the
    /// local presence flag, drop watermarks. Idempotent; an in-flight
    /// write cannot be retracted.
    pub async fn leave_session(&self) -> Result<(), SessionError> {
        let mut active = self.active.write().await;
        let Some(session) = active.take() else {
            return Ok(());
        };
        for task in &session.tasks {
            task.abort();
        }
        // Best effort: leaving must succeed even if the store is gone;
        // the disconnect hook covers the presence flag in that case
        if let Err(e) = self
            .store
            .set(&paths::presence(&session.code, session.role), json!(false))
            .await
        {
            warn!(code = %session.code, error = %e, "failed to clear presence on leave");
        }
        info!(code = %session.code, "left session");
        Ok(())
    }

    /// Publish a local move. `snapshot` is an optional serialized
    /// position persisted for fast rejoin.
    pub async fn send_move(
        &self,
        from: &str,
        to: &str,
        promotion: Option<&str>,
        snapshot: Option<&str>,
    ) -> Result<(), SessionError> {
        let active = self.active.read().await;
        let session = active.as_ref().ok_or(SessionError::NotActive)?;
        session.moves.send_move(from, to, promotion, snapshot).await?;
        Ok(())
    }

    /// Send a chat message
    pub async fn send_chat(&self, text: &str) -> Result<(), SessionError> {
        let active = self.active.read().await;
        let session = active.as_ref().ok_or(SessionError::NotActive)?;
        session.chat.send_chat(text).await?;
        Ok(())
    }

    /// Send a session-control signal
    pub async fn send_action(&self, kind: ActionKind) -> Result<(), SessionError> {
        let active = self.active.read().await;
        let session = active.as_ref().ok_or(SessionError::NotActive)?;
        session.actions.send_action(kind).await?;
        Ok(())
    }

    pub async fn resign(&self) -> Result<(), SessionError> {
        self.send_action(ActionKind::Resign).await
    }

    pub async fn offer_draw(&self) -> Result<(), SessionError> {
        self.send_action(ActionKind::DrawOffer).await
    }

    pub async fn accept_draw(&self) -> Result<(), SessionError> {
        self.send_action(ActionKind::DrawAccept).await
    }

    pub async fn decline_draw(&self) -> Result<(), SessionError> {
        self.send_action(ActionKind::DrawDecline).await
    }

    pub async fn request_rematch(&self) -> Result<(), SessionError> {
        self.send_action(ActionKind::Rematch).await
    }

    /// Code of the active session, if any
    pub async fn session_code(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|s| s.code.clone())
    }

    /// Local role in the active session
    pub async fn role(&self) -> Option<Role> {
        self.active.read().await.as_ref().map(|s| s.role)
    }

    /// Local board color in the active session
    pub async fn color(&self) -> Option<Color> {
        self.active.read().await.as_ref().map(|s| s.role.color())
    }

    pub async fn is_active(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Last observed opponent connectivity (false until the first
    /// presence notification arrives)
    pub async fn opponent_connected(&self) -> bool {
        self.active
            .read()
            .await
            .as_ref()
            .and_then(|s| s.presence.opponent_connected())
            .unwrap_or(false)
    }

    /// Current timestamp-ordered chat list
    pub async fn chat_messages(&self) -> Vec<ChatRecord> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|s| s.chat.messages())
            .unwrap_or_default()
    }

    /// Wire the four components and spawn their consumer tasks
    async fn wire(
        &self,
        session_code: String,
        role: Role,
        move_mark: usize,
        action_mark: usize,
    ) -> Result<ActiveSession, StoreError> {
        let moves = Arc::new(MoveSynchronizer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.rules),
            self.events.clone(),
            session_code.as_str(),
            role,
            move_mark,
        ));
        let actions = Arc::new(ActionChannel::new(
            Arc::clone(&self.store),
            self.events.clone(),
            session_code.as_str(),
            role,
            action_mark,
        ));
        let chat = Arc::new(ChatRelay::new(
            Arc::clone(&self.store),
            self.events.clone(),
            session_code.as_str(),
            role,
        ));
        let presence = Arc::new(PresenceTracker::new(self.events.clone(), session_code.as_str()));

        let mut tasks = Vec::new();
        let rx = self.store.subscribe(&paths::moves(&session_code)).await?;
        tasks.push(tokio::spawn(Arc::clone(&moves).run(rx)));
        let rx = self.store.subscribe(&paths::actions(&session_code)).await?;
        tasks.push(tokio::spawn(Arc::clone(&actions).run(rx)));
        let rx = self.store.subscribe(&paths::chat(&session_code)).await?;
        tasks.push(tokio::spawn(Arc::clone(&chat).run(rx)));
        let rx = self
            .store
            .subscribe(&paths::presence(&session_code, role.opponent()))
            .await?;
        tasks.push(tokio::spawn(Arc::clone(&presence).run(rx)));

        Ok(ActiveSession {
            code: session_code,
            role,
            moves,
            actions,
            chat,
            presence,
            tasks,
        })
    }

    #[cfg(test)]
    pub(crate) async fn move_watermark(&self) -> Option<usize> {
        self.active.read().await.as_ref().map(|s| s.moves.watermark())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(active) = self.active.try_read() {
            if let Some(session) = active.as_ref() {
                for task in &session.tasks {
                    task.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RecordingRules;
    use crate::store::{MemoryConnection, MemoryStore};
    use std::time::Duration;
    use tokio_test::assert_ok;
    use tokio::time::timeout;

    fn make_manager(store: &MemoryStore) -> (SessionManager, Arc<MemoryConnection>, Arc<RecordingRules>) {
        let conn = Arc::new(store.connect());
        let rules = Arc::new(RecordingRules::new());
        let store_dyn: Arc<dyn SessionStore> = conn.clone();
        let rules_dyn: Arc<dyn RulesEngine> = rules.clone();
        let manager = SessionManager::new(store_dyn, rules_dyn, SyncConfig::default());
        (manager, conn, rules)
    }

    async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    // ==================== Create Tests ====================

    #[tokio::test]
    async fn create_session_returns_code_and_writes_document() {
        let store = MemoryStore::new();
        let (manager, conn, _) = make_manager(&store);

        let code = manager.create_session().await.unwrap();
        assert_eq!(code.len(), 6);

        let doc: SessionDoc = serde_json::from_value(
            conn.get(&paths::session(&code)).await.unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(doc.code, code);
        assert!(doc.host_present);
        assert!(!doc.guest_present);
        assert!(doc.moves.is_empty());
        assert!(doc.board.starts_with("rnbqkbnr"));
    }

    #[tokio::test]
    async fn create_session_assigns_host_white() {
        let store = MemoryStore::new();
        let (manager, _, _) = make_manager(&store);

        manager.create_session().await.unwrap();

        assert_eq!(manager.role().await, Some(Role::Host));
        assert_eq!(manager.color().await, Some(Color::White));
        assert!(manager.is_active().await);
    }

    #[tokio::test]
    async fn create_session_while_active_fails() {
        let store = MemoryStore::new();
        let (manager, _, _) = make_manager(&store);

        manager.create_session().await.unwrap();
        let result = manager.create_session().await;
        assert!(matches!(result, Err(SessionError::AlreadyActive(_))));
    }

    #[tokio::test]
    async fn create_session_store_failure_surfaces() {
        let store = MemoryStore::new();
        let (manager, conn, _) = make_manager(&store);

        conn.set_offline(true);
        let result = manager.create_session().await;
        assert!(matches!(result, Err(SessionError::Store(_))));
        assert!(!manager.is_active().await);
    }

    // ==================== Join Tests ====================

    #[tokio::test]
    async fn join_unknown_code_fails_with_not_found() {
        let store = MemoryStore::new();
        let (manager, _, _) = make_manager(&store);

        let result = manager.join_session("NOSUCH").await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
        assert!(!manager.is_active().await);
    }

    #[tokio::test]
    async fn join_session_with_absent_host_fails() {
        let store = MemoryStore::new();
        let (host, host_conn, _) = make_manager(&store);
        let (guest, _, _) = make_manager(&store);

        let code = host.create_session().await.unwrap();
        host_conn.sever().await;

        let result = guest.join_session(&code).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn join_session_sets_guest_present_and_role() {
        let store = MemoryStore::new();
        let (host, conn, _) = make_manager(&store);
        let (guest, _, _) = make_manager(&store);

        let code = host.create_session().await.unwrap();
        tokio_test::assert_ok!(guest.join_session(&code).await);

        assert_eq!(guest.role().await, Some(Role::Guest));
        assert_eq!(guest.color().await, Some(Color::Black));
        assert_eq!(
            conn.get(&paths::presence(&code, Role::Guest)).await.unwrap(),
            Some(json!(true))
        );
    }

    #[tokio::test]
    async fn join_captures_watermark_and_loads_board() {
        let store = MemoryStore::new();
        let (host, _, _) = make_manager(&store);
        let (guest, _, guest_rules) = make_manager(&store);

        let code = host.create_session().await.unwrap();
        host.send_move("e2", "e4", None, Some("fen-after-e4"))
            .await
            .unwrap();

        let mut rx = guest.subscribe();
        guest.join_session(&code).await.unwrap();

        // The historical move is consumed silently; the snapshot is
        // delivered instead (presence events may interleave)
        loop {
            match next_event(&mut rx).await {
                SessionEvent::BoardLoaded { board } => {
                    assert_eq!(board, "fen-after-e4");
                    break;
                }
                SessionEvent::MoveApplied { .. } => panic!("historical move was re-applied"),
                _ => {}
            }
        }
        assert_eq!(guest.move_watermark().await, Some(1));
        assert!(guest_rules.applied().is_empty());
    }

    // ==================== Send Tests ====================

    #[tokio::test]
    async fn send_move_without_session_fails() {
        let store = MemoryStore::new();
        let (manager, _, _) = make_manager(&store);

        let result = manager.send_move("e2", "e4", None, None).await;
        assert!(matches!(result, Err(SessionError::NotActive)));
    }

    #[tokio::test]
    async fn send_chat_without_session_fails() {
        let store = MemoryStore::new();
        let (manager, _, _) = make_manager(&store);

        assert!(matches!(
            manager.send_chat("hello").await,
            Err(SessionError::NotActive)
        ));
    }

    #[tokio::test]
    async fn remote_move_reaches_peer_exactly_once() {
        let store = MemoryStore::new();
        let (host, _, _) = make_manager(&store);
        let (guest, _, guest_rules) = make_manager(&store);

        let code = host.create_session().await.unwrap();
        let mut guest_rx = guest.subscribe();
        guest.join_session(&code).await.unwrap();

        host.send_move("e2", "e4", None, None).await.unwrap();

        loop {
            if let SessionEvent::MoveApplied { from, to, .. } = next_event(&mut guest_rx).await {
                assert_eq!(from, "e2");
                assert_eq!(to, "e4");
                break;
            }
        }

        let applied = guest_rules.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].from, "e2");
    }

    #[tokio::test]
    async fn convenience_senders_map_to_action_kinds() {
        let store = MemoryStore::new();
        let (host, conn, _) = make_manager(&store);

        let code = host.create_session().await.unwrap();
        host.resign().await.unwrap();
        host.offer_draw().await.unwrap();
        host.accept_draw().await.unwrap();
        host.decline_draw().await.unwrap();
        host.request_rematch().await.unwrap();

        let value = conn.get(&paths::actions(&code)).await.unwrap().unwrap();
        let log: Vec<crate::types::ActionRecord> = crate::types::keyed_records(value);
        let kinds: Vec<_> = log.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::Resign,
                ActionKind::DrawOffer,
                ActionKind::DrawAccept,
                ActionKind::DrawDecline,
                ActionKind::Rematch,
            ]
        );
    }

    // ==================== Leave Tests ====================

    #[tokio::test]
    async fn leave_session_clears_presence_and_state() {
        let store = MemoryStore::new();
        let (host, conn, _) = make_manager(&store);

        let code = host.create_session().await.unwrap();
        host.leave_session().await.unwrap();

        assert!(!host.is_active().await);
        assert_eq!(host.session_code().await, None);
        assert_eq!(
            conn.get(&paths::presence(&code, Role::Host)).await.unwrap(),
            Some(json!(false))
        );
    }

    #[tokio::test]
    async fn leave_session_is_idempotent() {
        let store = MemoryStore::new();
        let (manager, _, _) = make_manager(&store);

        assert!(manager.leave_session().await.is_ok());
        assert!(manager.leave_session().await.is_ok());
    }

    #[tokio::test]
    async fn leave_session_succeeds_with_store_offline() {
        let store = MemoryStore::new();
        let (host, conn, _) = make_manager(&store);

        host.create_session().await.unwrap();
        conn.set_offline(true);

        assert!(host.leave_session().await.is_ok());
        assert!(!host.is_active().await);
    }

    #[tokio::test]
    async fn rejoin_after_leave_works() {
        let store = MemoryStore::new();
        let (host, _, _) = make_manager(&store);
        let (guest, _, _) = make_manager(&store);

        let code = host.create_session().await.unwrap();
        guest.join_session(&code).await.unwrap();
        guest.leave_session().await.unwrap();

        tokio_test::assert_ok!(guest.join_session(&code).await);
        assert!(guest.is_active().await);
    }

    // ==================== Presence Tests ====================

    #[tokio::test]
    async fn host_observes_guest_arrival() {
        let store = MemoryStore::new();
        let (host, _, _) = make_manager(&store);
        let (guest, _, _) = make_manager(&store);

        let code = host.create_session().await.unwrap();
        let mut host_rx = host.subscribe();
        guest.join_session(&code).await.unwrap();

        loop {
            if let SessionEvent::OpponentPresence { connected: true } =
                next_event(&mut host_rx).await
            {
                break;
            }
        }
        assert!(host.opponent_connected().await);
    }
}
