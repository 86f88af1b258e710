//! ChatEngine - owns the active session and reconciles sends with the server
//!
//! A send runs in three locked phases around two unlocked network calls:
//! the optimistic state is applied, the chat request goes out, and once
//! the server answers the full message list is fetched and swapped in.
//! Every phase after the first re-checks that the captured session is
//! still the active one; late responses for a session the user left are
//! dropped.

use std::collections::HashSet;
use std::sync::Arc;

use chat_client::{
    ApiError, ChatBackend, ChatRequest, ChatResponse, CreateSessionRequest, ModelCatalog,
};
use chat_core::{Message, Session, Turn, TurnKey};
use chat_state::{
    classify, Direction, MessageStore, SendEvent, SendIntent, SendState, StateMachine,
    VersionSelector,
};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::structs::{EngineSettings, PendingSend, SendOutcome};
use crate::view::{turn_views, EngineSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendMode {
    Classify,
    NewTurn,
}

/// State belonging to the session currently on screen. Replaced wholesale
/// on every session switch.
struct ActiveSession {
    epoch: u64,
    session_id: Option<String>,
    creating: bool,
    store: MessageStore,
    selector: VersionSelector,
    machine: StateMachine,
    pending: Option<PendingSend>,
    notice: Option<String>,
}

impl ActiveSession {
    fn new(epoch: u64, session_id: Option<String>) -> Self {
        Self {
            epoch,
            session_id,
            creating: false,
            store: MessageStore::new(),
            selector: VersionSelector::new(),
            machine: StateMachine::new(),
            pending: None,
            notice: None,
        }
    }

    fn is(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }

    fn settle(&mut self) {
        if let Err(err) = self.machine.handle_event(SendEvent::Settled) {
            warn!(error = %err, "could not settle send state");
        }
    }

    fn prune_selection(&mut self) {
        let live = self.store.tree().keys();
        self.selector.retain(&live);
    }
}

struct EngineInner {
    active: ActiveSession,
    in_flight: HashSet<String>,
    sessions: Vec<Session>,
    models: Option<ModelCatalog>,
    next_epoch: u64,
}

impl EngineInner {
    fn switch_to(&mut self, session_id: Option<String>, messages: Vec<Message>) {
        if let Err(err) = self.active.machine.handle_event(SendEvent::SessionSwitched) {
            warn!(error = %err, "session switch rejected by state machine");
        }
        self.next_epoch += 1;

        let mut active = ActiveSession::new(self.next_epoch, session_id);
        active.store.replace(messages);
        if let Some(id) = active.session_id.as_deref() {
            // A send started earlier for this session is still out.
            if self.in_flight.contains(id) {
                active.machine = StateMachine::with_state(SendState::Sending {
                    session_id: id.to_string(),
                    retry: false,
                });
            }
        }
        self.active = active;
    }

    fn snapshot(&self) -> EngineSnapshot {
        let tree = self.active.store.tree();
        EngineSnapshot {
            session_id: self.active.session_id.clone(),
            state: self.active.machine.state().clone(),
            turns: turn_views(&tree, &self.active.selector),
            notice: self.active.notice.clone(),
            sessions: self.sessions.clone(),
            models: self
                .models
                .as_ref()
                .map(|catalog| catalog.models.clone())
                .unwrap_or_default(),
            anomalies: tree.anomalies().len(),
        }
    }
}

pub struct ChatEngine<B: ChatBackend> {
    backend: Arc<B>,
    settings: EngineSettings,
    inner: Arc<Mutex<EngineInner>>,
    updates: Arc<watch::Sender<EngineSnapshot>>,
}

impl<B: ChatBackend> Clone for ChatEngine<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            settings: self.settings.clone(),
            inner: Arc::clone(&self.inner),
            updates: Arc::clone(&self.updates),
        }
    }
}

impl<B: ChatBackend> ChatEngine<B> {
    /// Create an engine with no active session.
    pub fn new(backend: Arc<B>, settings: EngineSettings) -> Self {
        let inner = EngineInner {
            active: ActiveSession::new(0, None),
            in_flight: HashSet::new(),
            sessions: Vec::new(),
            models: None,
            next_epoch: 0,
        };
        let (updates, _) = watch::channel(inner.snapshot());
        Self {
            backend,
            settings,
            inner: Arc::new(Mutex::new(inner)),
            updates: Arc::new(updates),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Receives a fresh snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.updates.subscribe()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.inner.lock().await.active.session_id.clone()
    }

    pub async fn dismiss_notice(&self) {
        let mut inner = self.inner.lock().await;
        if inner.active.notice.take().is_some() {
            self.publish(&inner);
        }
    }

    fn publish(&self, inner: &EngineInner) {
        self.updates.send_replace(inner.snapshot());
    }

    /// Send `text` in the active session, creating a session first if
    /// there is none. Repeating an existing prompt regenerates that turn.
    pub async fn send(&self, text: &str, model: Option<&str>) -> Result<SendOutcome> {
        self.send_with(text, model, SendMode::Classify).await
    }

    /// Ask for another version of a turn's reply.
    pub async fn regenerate(&self, key: &TurnKey, model: Option<&str>) -> Result<SendOutcome> {
        let prompt = {
            let inner = self.inner.lock().await;
            let tree = inner.active.store.tree();
            let turn = tree
                .turn(key)
                .filter(|t| !t.synthetic_root)
                .ok_or_else(|| EngineError::TurnNotFound(key.clone()))?;
            turn.prompt().to_string()
        };
        self.send_with(&prompt, model, SendMode::Classify).await
    }

    /// Replace a turn's prompt: the turn and everything after it is dropped
    /// locally and the new text is sent as a fresh turn.
    pub async fn edit(&self, key: &TurnKey, text: &str, model: Option<&str>) -> Result<SendOutcome> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyInput);
        }
        {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            if let Some(id) = inner.active.session_id.as_deref() {
                if inner.in_flight.contains(id) {
                    return Err(EngineError::SendInProgress(id.to_string()));
                }
            }
            let removed = inner.active.store.truncate_from_turn(key);
            if removed.is_empty() {
                return Err(EngineError::TurnNotFound(key.clone()));
            }
            debug!(turn = %key, removed = removed.len(), "truncated conversation for edit");
            inner.active.prune_selection();
            self.publish(inner);
        }
        self.send_with(text, model, SendMode::NewTurn).await
    }

    /// Start a new session seeded with `text`.
    pub async fn branch(&self, text: &str, model: Option<&str>) -> Result<SendOutcome> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyInput);
        }
        self.new_chat().await;
        self.send(text, model).await
    }

    /// Leave the active session. The next send creates a new one.
    pub async fn new_chat(&self) {
        let mut inner = self.inner.lock().await;
        inner.switch_to(None, Vec::new());
        self.publish(&inner);
    }

    /// Switch to `session_id`. Messages and the session list are fetched
    /// together; nothing changes unless the messages arrive.
    pub async fn load_session(&self, session_id: &str) -> Result<()> {
        let (sessions, messages) = tokio::join!(
            self.backend.list_sessions(&self.settings.user_id),
            self.backend.get_messages(session_id)
        );

        let mut inner = self.inner.lock().await;
        let messages = match messages {
            Ok(messages) => messages,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "failed to load session messages");
                inner.active.notice = Some(format!("Could not load session {}: {}", session_id, err));
                self.publish(&inner);
                return Err(EngineError::FetchMessagesFailed(err.to_string()));
            }
        };
        match sessions {
            Ok(sessions) => inner.sessions = sessions,
            Err(err) => warn!(error = %err, "failed to refresh session list"),
        }

        info!(session_id = %session_id, count = messages.len(), "session loaded");
        inner.switch_to(Some(session_id.to_string()), messages);
        self.publish(&inner);
        Ok(())
    }

    pub async fn refresh_sessions(&self) -> Result<Vec<Session>> {
        let sessions = self
            .backend
            .list_sessions(&self.settings.user_id)
            .await
            .map_err(|err| EngineError::FetchSessionsFailed(err.to_string()))?;
        let mut inner = self.inner.lock().await;
        inner.sessions = sessions.clone();
        self.publish(&inner);
        Ok(sessions)
    }

    /// Fetch the server's model catalogue and cache it.
    pub async fn list_models(&self) -> Result<ModelCatalog> {
        let catalog = self
            .backend
            .list_models()
            .await
            .map_err(|err| EngineError::FetchModelsFailed(err.to_string()))?;
        let mut inner = self.inner.lock().await;
        inner.models = Some(catalog.clone());
        self.publish(&inner);
        Ok(catalog)
    }

    /// Check `name` against the catalogue, fetching it on first use.
    /// An empty catalogue accepts any name.
    pub async fn check_model(&self, name: &str) -> Result<String> {
        let cached = self.inner.lock().await.models.clone();
        let catalog = match cached {
            Some(catalog) => catalog,
            None => self.list_models().await?,
        };
        if catalog.is_empty() || catalog.contains(name) {
            Ok(name.to_string())
        } else {
            Err(EngineError::UnknownModel(name.to_string()))
        }
    }

    /// Re-fetch the active session's messages and swap them in.
    pub async fn refresh(&self) -> Result<()> {
        let (session_id, epoch) = {
            let inner = self.inner.lock().await;
            let id = inner
                .active
                .session_id
                .clone()
                .ok_or(EngineError::NoActiveSession)?;
            if inner.in_flight.contains(&id) {
                return Err(EngineError::SendInProgress(id));
            }
            (id, inner.active.epoch)
        };

        let messages = self
            .backend
            .get_messages(&session_id)
            .await
            .map_err(|err| EngineError::FetchMessagesFailed(err.to_string()))?;

        let mut inner = self.inner.lock().await;
        if inner.active.epoch != epoch || inner.in_flight.contains(&session_id) {
            debug!(session_id = %session_id, "dropping refresh for inactive session");
            return Ok(());
        }
        inner.active.store.replace(messages);
        inner.active.prune_selection();
        self.publish(&inner);
        Ok(())
    }

    /// Correct a stored message's text without generating a new version.
    pub async fn correct_message(&self, message_id: &str, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(EngineError::EmptyInput);
        }
        {
            let inner = self.inner.lock().await;
            let confirmed = inner
                .active
                .store
                .get(message_id)
                .is_some_and(|m| m.server_id().is_some());
            if !confirmed {
                return Err(EngineError::MessageNotFound(message_id.to_string()));
            }
        }

        self.backend
            .update_message(message_id, content)
            .await
            .map_err(|err| EngineError::UpdateFailed(err.to_string()))?;
        info!(message_id, "message corrected");
        self.refresh().await
    }

    /// Display version `index` of a turn (clamped). Returns the index shown.
    pub async fn select_version(&self, key: &TurnKey, index: isize) -> Result<Option<usize>> {
        let mut inner = self.inner.lock().await;
        let tree = inner.active.store.tree();
        let count = tree
            .turn(key)
            .map(Turn::version_count)
            .ok_or_else(|| EngineError::TurnNotFound(key.clone()))?;
        let selected = inner.active.selector.set(key, index, count);
        self.publish(&inner);
        Ok(selected)
    }

    pub async fn advance(&self, key: &TurnKey, direction: Direction) -> Result<Option<usize>> {
        let mut inner = self.inner.lock().await;
        let tree = inner.active.store.tree();
        let count = tree
            .turn(key)
            .map(Turn::version_count)
            .ok_or_else(|| EngineError::TurnNotFound(key.clone()))?;
        let selected = inner.active.selector.advance(key, direction, count);
        self.publish(&inner);
        Ok(selected)
    }

    async fn send_with(&self, text: &str, model: Option<&str>, mode: SendMode) -> Result<SendOutcome> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let model = model.map_or_else(|| self.settings.default_model.clone(), str::to_string);

        let (epoch, existing) = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            if inner.active.creating {
                return Err(EngineError::SendInProgress("(new session)".to_string()));
            }
            if let Some(id) = inner.active.session_id.as_deref() {
                if inner.in_flight.contains(id) || !inner.active.machine.state().accepts_user_input() {
                    return Err(EngineError::SendInProgress(id.to_string()));
                }
            }
            let existing = inner.active.session_id.clone();
            if existing.is_none() {
                inner.active.creating = true;
            }
            (inner.active.epoch, existing)
        };

        let session_id = match existing {
            Some(id) => id,
            None => self.create_session(epoch).await?,
        };

        let pending = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            if inner.active.epoch != epoch {
                info!(session_id = %session_id, "session switched before the send started");
                return Ok(SendOutcome::Stale { session_id });
            }
            if inner.in_flight.contains(&session_id) {
                return Err(EngineError::SendInProgress(session_id));
            }

            let active = &mut inner.active;
            active.creating = false;
            active.session_id = Some(session_id.clone());

            let intent = match mode {
                SendMode::Classify => classify(text, active.store.current()),
                SendMode::NewTurn => SendIntent::NewTurn,
            };
            active.machine.handle_event(SendEvent::SendRequested {
                session_id: session_id.clone(),
                retry: intent.is_retry(),
            })?;

            let pending = apply_optimistic(active, &session_id, text, &model, intent);
            debug!(
                session_id = %session_id,
                turn = %pending.turn,
                index = pending.optimistic_index,
                retry = pending.intent.is_retry(),
                "optimistic send applied"
            );
            active.pending = Some(pending.clone());
            active.notice = None;
            inner.in_flight.insert(session_id.clone());
            self.publish(inner);
            pending
        };

        let request = ChatRequest {
            message: pending.text.clone(),
            session_id: session_id.clone(),
            user_id: self.settings.user_id.clone(),
            model,
        };
        let response = match self.backend.send_chat(request).await {
            Ok(response) => response,
            Err(err) => return Ok(self.settle_failure(&session_id, &err).await),
        };

        {
            let mut inner = self.inner.lock().await;
            if !inner.active.is(&session_id) {
                inner.in_flight.remove(&session_id);
                info!(session_id = %session_id, "ignoring response for inactive session");
                return Ok(SendOutcome::Stale { session_id });
            }
        }

        let fetch_id = if response.session_id.is_empty() {
            session_id.clone()
        } else {
            response.session_id.clone()
        };
        let fetched = self.backend.get_messages(&fetch_id).await;

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.in_flight.remove(&session_id);
        if !inner.active.is(&session_id) {
            info!(session_id = %session_id, "ignoring refresh for inactive session");
            return Ok(SendOutcome::Stale { session_id });
        }
        if fetch_id != session_id {
            warn!(session_id = %session_id, server_session_id = %fetch_id, "server answered in a different session");
            inner.active.session_id = Some(fetch_id.clone());
        }
        let outcome = confirm(&mut inner.active, fetch_id, &response, fetched);
        self.publish(inner);
        Ok(outcome)
    }

    async fn create_session(&self, epoch: u64) -> Result<String> {
        let request = CreateSessionRequest {
            user_id: self.settings.user_id.clone(),
            title: self.settings.new_session_title.clone(),
            project_id: None,
        };
        let created = self.backend.create_session(request).await;

        let mut inner = self.inner.lock().await;
        if inner.active.epoch == epoch {
            inner.active.creating = false;
        }
        match created {
            Ok(session) => {
                info!(session_id = %session.id, "session created");
                let id = session.id.clone();
                if !inner.sessions.iter().any(|s| s.id == id) {
                    inner.sessions.insert(0, session);
                }
                Ok(id)
            }
            Err(err) => {
                warn!(error = %err, "session creation failed");
                if inner.active.epoch == epoch {
                    inner.active.notice = Some(format!("Could not create a session: {}", err));
                    self.publish(&inner);
                }
                Err(EngineError::SessionCreateFailed(err.to_string()))
            }
        }
    }

    async fn settle_failure(&self, session_id: &str, err: &ApiError) -> SendOutcome {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.in_flight.remove(session_id);
        if !inner.active.is(session_id) {
            info!(session_id = %session_id, error = %err, "ignoring failure for inactive session");
            return SendOutcome::Stale {
                session_id: session_id.to_string(),
            };
        }

        warn!(session_id = %session_id, error = %err, "send failed");
        let description = err.to_string();
        fail(&mut inner.active, &description);
        self.publish(inner);
        SendOutcome::Failed {
            session_id: session_id.to_string(),
            error: EngineError::SendFailed(description),
        }
    }
}

fn apply_optimistic(
    active: &mut ActiveSession,
    session_id: &str,
    text: &str,
    model: &str,
    intent: SendIntent,
) -> PendingSend {
    // Leftovers of an earlier failed send for the same prompt.
    let cleared = match &intent {
        SendIntent::Retry {
            root_message_id, ..
        } => active.store.remove_local_replies(*root_message_id),
        SendIntent::NewTurn => active.store.remove_local_turns(text),
    };
    if cleared > 0 {
        debug!(cleared, "dropped local messages from an earlier attempt");
    }
    let snapshot = active.store.current().to_vec();

    let (turn, parent, index, optimistic_root) = match &intent {
        SendIntent::Retry {
            turn,
            root_message_id,
            prospective_index,
        } => (turn.clone(), *root_message_id, *prospective_index, None),
        SendIntent::NewTurn => {
            let root_id = active.store.allocate_provisional_id();
            let root = Message::optimistic_user(session_id, root_id, text);
            active.store.append_optimistic(root.clone());
            (TurnKey::new(root.id.clone()), root_id, 0, Some(root))
        }
    };

    let placeholder_id = active.store.allocate_provisional_id();
    let placeholder =
        Message::pending_reply(session_id, placeholder_id, parent, index, Some(model.to_string()));
    let placeholder_id = placeholder.id.clone();
    active.store.append_optimistic(placeholder);

    let count = active.store.tree().turn(&turn).map_or(0, Turn::version_count);
    active.selector.set(&turn, index as isize, count);

    PendingSend {
        session_id: session_id.to_string(),
        text: text.to_string(),
        intent,
        turn,
        optimistic_index: index,
        placeholder_id,
        optimistic_root,
        snapshot,
    }
}

/// Apply a successful send. The refreshed list replaces everything local;
/// the turn that received the reply is located again and shows its newest
/// version.
fn confirm(
    active: &mut ActiveSession,
    session_id: String,
    response: &ChatResponse,
    fetched: std::result::Result<Vec<Message>, ApiError>,
) -> SendOutcome {
    if let Err(err) = active.machine.handle_event(SendEvent::ResponseReceived) {
        warn!(error = %err, "unexpected response event");
    }
    let pending = active.pending.take();

    match fetched {
        Ok(messages) => {
            let discarded = active.store.replace(messages);
            debug!(session_id = %session_id, discarded, "store refreshed after send");
        }
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "refresh after send failed");
            if let Some(pending) = &pending {
                show_unrefreshed_reply(active, pending, response);
            }
            active.notice = Some(format!(
                "Reply received but the conversation could not be refreshed: {}",
                err
            ));
        }
    }
    active.prune_selection();

    let tree = active.store.tree();
    let located = pending.as_ref().and_then(|p| {
        let by_root = match &p.intent {
            SendIntent::Retry {
                root_message_id, ..
            } => tree.turn_by_root_id(*root_message_id),
            SendIntent::NewTurn => None,
        };
        by_root.or_else(|| tree.latest_root_with_content(&p.text))
    });

    let (turn, version) = match located {
        Some(turn) => {
            let version = turn.latest_index().and_then(|last| {
                active
                    .selector
                    .set(&turn.key, last as isize, turn.version_count())
            });
            (Some(turn.key.clone()), version)
        }
        None => {
            if pending.is_some() {
                warn!(session_id = %session_id, "confirmed turn not found after refresh");
            }
            (None, None)
        }
    };

    active.settle();
    SendOutcome::Confirmed {
        session_id,
        turn,
        version,
    }
}

/// Fill the reply slot with the response itself when the list could not
/// be re-fetched. Its position stays the optimistic one.
fn show_unrefreshed_reply(active: &mut ActiveSession, pending: &PendingSend, response: &ChatResponse) {
    let reply = match response.message.clone() {
        Some(message) => message,
        None => match active.store.get(&pending.placeholder_id) {
            Some(slot) => {
                let mut message = slot.clone();
                message.content = response.response.clone();
                message.agent_type = response.agent_type.clone();
                message
            }
            None => return,
        },
    };

    let mut reply = reply.with_session(pending.session_id.clone());
    reply.parent_id = pending.parent_ref();
    reply.sibling_index = Some(pending.optimistic_index);
    if !active.store.replace_local(&pending.placeholder_id, reply) {
        debug!(placeholder = %pending.placeholder_id, "reply slot already gone");
    }
}

/// Roll back to the pre-send list, keep the prompt visible, and show the
/// failure as the reply.
fn fail(active: &mut ActiveSession, description: &str) {
    if let Err(err) = active.machine.handle_event(SendEvent::SendErrored {
        error: description.to_string(),
    }) {
        warn!(error = %err, "unexpected error event");
    }

    if let Some(pending) = active.pending.take() {
        let parent = pending.parent_ref();
        active.store.restore(pending.snapshot);
        if let Some(root) = pending.optimistic_root {
            active.store.append_optimistic(root);
        }
        if let Some(parent) = parent {
            let error_id = active.store.allocate_provisional_id();
            active.store.append_optimistic(Message::error_reply(
                pending.session_id,
                error_id,
                parent,
                pending.optimistic_index,
                description,
            ));
            let count = active.store.tree().turn(&pending.turn).map_or(0, Turn::version_count);
            active
                .selector
                .set(&pending.turn, pending.optimistic_index as isize, count);
        }
    }

    active.notice = Some(format!("Send failed: {}", description));
    active.settle();
}
