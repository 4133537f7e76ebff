//! Testing helpers: a scripted in-memory bot.
//!
//! [`FakeBot`] keeps a chat history and reacts to sends, clicks and inline
//! picks with pre-scripted messages that become visible after a delay on the
//! tokio clock, so tests run on paused time.

use crate::client::{
    BotMessage, Button, ChatClient, ClientError, ForwardMode, InlineResult, MessageId, Peer,
};
use crate::config::Settings;
use crate::context::RunContext;
use crate::state::StateStore;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Author id of the scripted bot
pub const BOT_ID: i64 = 7;
/// Author id of the user session
pub const USER_ID: i64 = 1;
/// Label of the next button on scripted episodes
pub const NEXT_LABEL: &str = "Вперёд ▶";

struct Scheduled {
    visible_at: Instant,
    message: BotMessage,
}

struct Reaction {
    delay: Duration,
    messages: Vec<BotMessage>,
}

#[derive(Default)]
struct Inner {
    history: Vec<Scheduled>,
    on_click: HashMap<MessageId, VecDeque<Reaction>>,
    on_send: VecDeque<Reaction>,
    on_inline_pick: Option<Reaction>,
    inline_results: Vec<InlineResult>,
    forward_errors: HashMap<MessageId, ClientError>,
    click_error: Option<ClientError>,
    click_error_once: Option<ClientError>,
    unauthorized: bool,
    clicks: Vec<(MessageId, usize, usize)>,
    forwarded: Vec<MessageId>,
    sent_texts: Vec<String>,
    inline_queries: Vec<String>,
    inline_picks: Vec<String>,
    fetches: usize,
    connects: usize,
    disconnects: usize,
    hidden: HashSet<MessageId>,
}

/// Scripted bot implementing [`ChatClient`]
pub struct FakeBot {
    peer: Peer,
    inner: Mutex<Inner>,
}

impl Default for FakeBot {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBot {
    /// Empty chat with `@media_bot`
    #[must_use]
    pub fn new() -> Self {
        Self {
            peer: Peer {
                id: BOT_ID,
                handle: "@media_bot".to_string(),
            },
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The bot peer
    #[must_use]
    pub fn peer(&self) -> Peer {
        self.peer.clone()
    }

    /// Add a message that is visible immediately
    pub fn push(&self, message: BotMessage) {
        self.lock().history.push(Scheduled {
            visible_at: Instant::now(),
            message,
        });
    }

    /// Hide a message from `message_by_id` while keeping it in recent lists
    pub fn hide_from_lookup(&self, id: MessageId) {
        self.lock().hidden.insert(id);
    }

    /// Script the bot's answer to the next click on `message_id`
    pub fn on_click(&self, message_id: MessageId, delay: Duration, messages: Vec<BotMessage>) {
        self.lock()
            .on_click
            .entry(message_id)
            .or_default()
            .push_back(Reaction { delay, messages });
    }

    /// Script the bot's answer to the next text we send
    pub fn on_send(&self, delay: Duration, messages: Vec<BotMessage>) {
        self.lock().on_send.push_back(Reaction { delay, messages });
    }

    /// Script inline query results and the answer to picking one
    pub fn on_inline(&self, results: Vec<InlineResult>, delay: Duration, messages: Vec<BotMessage>) {
        let mut inner = self.lock();
        inner.inline_results = results;
        inner.on_inline_pick = Some(Reaction { delay, messages });
    }

    /// Make forwarding `id` fail
    pub fn fail_forward(&self, id: MessageId, err: ClientError) {
        self.lock().forward_errors.insert(id, err);
    }

    /// Make every click fail
    pub fn fail_clicks(&self, err: ClientError) {
        self.lock().click_error = Some(err);
    }

    /// Make only the next click fail
    pub fn fail_next_click(&self, err: ClientError) {
        self.lock().click_error_once = Some(err);
    }

    /// Report the session as unauthorized
    pub fn deauthorize(&self) {
        self.lock().unauthorized = true;
    }

    /// Clicks as `(message_id, row, col)`
    #[must_use]
    pub fn clicks(&self) -> Vec<(MessageId, usize, usize)> {
        self.lock().clicks.clone()
    }

    /// Forwarded message ids in order
    #[must_use]
    pub fn forwarded(&self) -> Vec<MessageId> {
        self.lock().forwarded.clone()
    }

    /// Texts sent to the bot
    #[must_use]
    pub fn sent_texts(&self) -> Vec<String> {
        self.lock().sent_texts.clone()
    }

    /// Inline queries issued
    #[must_use]
    pub fn inline_queries(&self) -> Vec<String> {
        self.lock().inline_queries.clone()
    }

    /// Result ids of picked inline results
    #[must_use]
    pub fn inline_picks(&self) -> Vec<String> {
        self.lock().inline_picks.clone()
    }

    /// Number of `recent_messages` calls
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.lock().fetches
    }

    /// `(connects, disconnects)`
    #[must_use]
    pub fn connections(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.connects, inner.disconnects)
    }

    fn schedule(inner: &mut Inner, reaction: Reaction) {
        let visible_at = Instant::now() + reaction.delay;
        inner.history.extend(
            reaction
                .messages
                .into_iter()
                .map(|message| Scheduled { visible_at, message }),
        );
    }

    fn visible(inner: &Inner) -> impl Iterator<Item = &BotMessage> + '_ {
        let now = Instant::now();
        inner
            .history
            .iter()
            .filter(move |s| s.visible_at <= now)
            .map(|s| &s.message)
    }
}

#[async_trait]
impl ChatClient for FakeBot {
    async fn connect(&self) -> Result<(), ClientError> {
        self.lock().connects += 1;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.lock().disconnects += 1;
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, ClientError> {
        Ok(!self.lock().unauthorized)
    }

    async fn resolve_peer(&self, handle: &str) -> Result<Peer, ClientError> {
        if handle == self.peer.handle {
            Ok(self.peer.clone())
        } else {
            Err(ClientError::PeerNotFound(handle.to_string()))
        }
    }

    async fn send_text(&self, _peer: &Peer, text: &str) -> Result<BotMessage, ClientError> {
        let mut inner = self.lock();
        inner.sent_texts.push(text.to_string());
        let id = Self::visible(&inner).map(|m| m.id).max().unwrap_or(0) + 1;
        let sent = user_text(id, text);
        inner.history.push(Scheduled {
            visible_at: Instant::now(),
            message: sent.clone(),
        });
        if let Some(reaction) = inner.on_send.pop_front() {
            Self::schedule(&mut inner, reaction);
        }
        Ok(sent)
    }

    async fn recent_messages(
        &self,
        _peer: &Peer,
        limit: usize,
    ) -> Result<Vec<BotMessage>, ClientError> {
        let mut inner = self.lock();
        inner.fetches += 1;
        let mut messages: Vec<BotMessage> = Self::visible(&inner).cloned().collect();
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn message_by_id(
        &self,
        _peer: &Peer,
        id: MessageId,
    ) -> Result<Option<BotMessage>, ClientError> {
        let inner = self.lock();
        if inner.hidden.contains(&id) {
            return Ok(None);
        }
        let found = Self::visible(&inner).find(|m| m.id == id).cloned();
        Ok(found)
    }

    async fn click(
        &self,
        _peer: &Peer,
        message_id: MessageId,
        row: usize,
        col: usize,
    ) -> Result<(), ClientError> {
        let mut inner = self.lock();
        inner.clicks.push((message_id, row, col));
        if let Some(err) = inner.click_error_once.take().or_else(|| inner.click_error.clone()) {
            return Err(err);
        }
        let reaction = inner
            .on_click
            .get_mut(&message_id)
            .and_then(VecDeque::pop_front);
        if let Some(reaction) = reaction {
            Self::schedule(&mut inner, reaction);
        }
        Ok(())
    }

    async fn forward(
        &self,
        _peer: &Peer,
        message_id: MessageId,
        _destination: &str,
        _mode: ForwardMode,
    ) -> Result<(), ClientError> {
        let mut inner = self.lock();
        if let Some(err) = inner.forward_errors.get(&message_id) {
            return Err(err.clone());
        }
        inner.forwarded.push(message_id);
        Ok(())
    }

    async fn inline_query(
        &self,
        _peer: &Peer,
        query: &str,
    ) -> Result<Vec<InlineResult>, ClientError> {
        let mut inner = self.lock();
        inner.inline_queries.push(query.to_string());
        Ok(inner.inline_results.clone())
    }

    async fn pick_inline_result(
        &self,
        _peer: &Peer,
        result: &InlineResult,
    ) -> Result<(), ClientError> {
        let mut inner = self.lock();
        inner.inline_picks.push(result.result_id.clone());
        if let Some(reaction) = inner.on_inline_pick.take() {
            Self::schedule(&mut inner, reaction);
        }
        Ok(())
    }
}

/// A text message we sent
#[must_use]
pub fn user_text(id: MessageId, text: &str) -> BotMessage {
    BotMessage {
        id,
        author_id: USER_ID,
        has_media: false,
        buttons: Vec::new(),
        text: text.to_string(),
    }
}

/// A plain text message from the bot
#[must_use]
pub fn bot_text(id: MessageId, text: &str) -> BotMessage {
    BotMessage {
        id,
        author_id: BOT_ID,
        has_media: false,
        buttons: Vec::new(),
        text: text.to_string(),
    }
}

/// A search results message with one callback button per row
#[must_use]
pub fn results(id: MessageId, labels: &[&str]) -> BotMessage {
    BotMessage {
        buttons: labels
            .iter()
            .map(|label| vec![Button::callback(label, &format!("pick:{label}"))])
            .collect(),
        ..bot_text(id, "Results")
    }
}

/// A media episode, optionally with a next button
#[must_use]
pub fn episode(id: MessageId, has_next: bool) -> BotMessage {
    let mut buttons = vec![vec![Button::callback("Серии", "list")]];
    if has_next {
        buttons.push(vec![
            Button::callback("◀ Назад", "prev"),
            Button::callback(NEXT_LABEL, "next"),
        ]);
    }
    BotMessage {
        id,
        author_id: BOT_ID,
        has_media: true,
        buttons,
        text: format!("Episode {id}"),
    }
}

/// Inline query result
#[must_use]
pub fn inline_result(id: &str, title: Option<&str>, description: Option<&str>) -> InlineResult {
    InlineResult {
        query_id: "query".to_string(),
        result_id: id.to_string(),
        title: title.map(str::to_string),
        description: description.map(str::to_string),
    }
}

/// Settings with short timeouts for scripted runs
#[must_use]
pub fn test_settings() -> Settings {
    Settings {
        bot_username: "@media_bot".to_string(),
        target_chat_id: "@archive".to_string(),
        button_next_text: "вперед".to_string(),
        search_results_timeout_seconds: 10,
        after_pick_timeout_seconds: 10,
        wait_next_media_timeout_seconds: 10,
        inline_pick_timeout_seconds: 10,
        max_retries_next: 3,
        wait_after_click_seconds: 1,
        search_delay_seconds: 0,
        batch_size: 10,
        sent_dedup_limit: 100,
        ..Settings::default()
    }
}

/// A scripted bot plus everything a [`RunContext`] borrows
pub struct Harness {
    /// The scripted bot
    pub bot: FakeBot,
    /// Its peer
    pub peer: Peer,
    /// Run settings
    pub settings: Settings,
    /// State store inside a temporary directory
    pub store: StateStore,
    /// Stop signal
    pub stop: CancellationToken,
    _dir: tempfile::TempDir,
}

impl Harness {
    /// Harness with [`test_settings`]
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    /// Harness with custom settings
    #[must_use]
    pub fn with_settings(settings: Settings) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let bot = FakeBot::new();
        Self {
            peer: bot.peer(),
            bot,
            settings,
            store: StateStore::new(dir.path().join("state.json")),
            stop: CancellationToken::new(),
            _dir: dir,
        }
    }

    /// Borrow a run context
    #[must_use]
    pub fn ctx(&self) -> RunContext<'_> {
        RunContext {
            client: &self.bot,
            peer: &self.peer,
            settings: &self.settings,
            store: &self.store,
            stop: &self.stop,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
