//! Per-event context for the weft framework.
//!
//! One [`Context`] is created per incoming update and shared as
//! `Arc<Context>` with every middleware unit of that dispatch. It is the
//! explicit capability struct handed to handlers:
//!
//! - the raw [`Update`] and its classification,
//! - per-event scratch state (a JSON map) and typed [`Extensions`],
//! - named slots that layered middleware (sessions, scenes) bind into,
//! - the last trigger [`Match`],
//! - the [`Outbound`] capability used to act on the platform.
//!
//! Nothing on the context outlives the dispatch that created it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::outbound::{BoxedOutbound, DetachedOutbound};
use crate::update::{CallbackQuery, Chat, InlineQuery, Message, Update, UpdateType, User};

/// Type alias for values stored in a context's named slots.
pub type SlotValue = Arc<dyn Any + Send + Sync>;

// =============================================================================
// Extensions
// =============================================================================

/// A type map holding at most one value per type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Creates an empty extension map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Returns a reference to the value of type `T`.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Removes and returns the value of type `T`.
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Moves every value of `other` into this map, overwriting duplicates.
    pub fn extend(&mut self, other: Extensions) {
        self.map.extend(other.map);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

// =============================================================================
// Match
// =============================================================================

/// The result of a successful trigger test.
///
/// Group `0` is the whole match; further groups are capture groups, which
/// may be absent when they did not participate in the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    groups: Vec<Option<String>>,
}

impl Match {
    /// Creates a match from its groups; `groups[0]` is the whole match.
    pub fn new(groups: Vec<Option<String>>) -> Self {
        Self { groups }
    }

    /// Creates a match consisting only of the whole matched value.
    pub fn whole(value: impl Into<String>) -> Self {
        Self {
            groups: vec![Some(value.into())],
        }
    }

    /// Returns the whole matched text.
    pub fn as_str(&self) -> &str {
        self.get(0).unwrap_or_default()
    }

    /// Returns capture group `index`, if it participated in the match.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// Returns the number of groups, including the whole match.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// =============================================================================
// Context
// =============================================================================

/// The per-event carrier threaded through a middleware chain.
///
/// # Example
///
/// ```rust,ignore
/// let ctx = Arc::new(Context::new(update, outbound).with_bot_username("weft_bot"));
/// chain.call(Arc::clone(&ctx), Next::noop()).await?;
/// ```
pub struct Context {
    update: Update,
    update_type: UpdateType,
    sub_types: Vec<&'static str>,
    outbound: BoxedOutbound,
    bot_username: Option<String>,
    state: Mutex<Map<String, Value>>,
    extensions: Mutex<Extensions>,
    slots: Mutex<HashMap<String, SlotValue>>,
    matched: Mutex<Option<Match>>,
}

impl Context {
    /// Creates the context for one update, classifying it once.
    pub fn new(update: Update, outbound: BoxedOutbound) -> Self {
        let update_type = update.update_type();
        let sub_types = update.sub_types();
        Self {
            update,
            update_type,
            sub_types,
            outbound,
            bot_username: None,
            state: Mutex::new(Map::new()),
            extensions: Mutex::new(Extensions::new()),
            slots: Mutex::new(HashMap::new()),
            matched: Mutex::new(None),
        }
    }

    /// Creates a context with no outbound transport attached.
    pub fn detached(update: Update) -> Self {
        Self::new(update, Arc::new(DetachedOutbound))
    }

    /// Sets the bot's own username, used to match `/command@bot` forms.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    // ─── Update and classification ───────────────────────────────────────────

    /// Returns the raw update.
    pub fn update(&self) -> &Update {
        &self.update
    }

    /// Returns the payload classification.
    pub fn update_type(&self) -> UpdateType {
        self.update_type
    }

    /// Returns the wire name of the payload, including unknown payloads.
    pub fn update_type_name(&self) -> &str {
        self.update.type_name()
    }

    /// Returns the message sub types of this update.
    pub fn sub_types(&self) -> &[&'static str] {
        &self.sub_types
    }

    /// Returns `true` if the update type or one of the sub types is `name`.
    pub fn is_classified_as(&self, name: &str) -> bool {
        self.update_type_name() == name || self.sub_types.contains(&name)
    }

    /// Returns the message or channel post (edited or not).
    pub fn message(&self) -> Option<&Message> {
        self.update.any_message()
    }

    pub fn callback_query(&self) -> Option<&CallbackQuery> {
        self.update.callback_query.as_ref()
    }

    pub fn inline_query(&self) -> Option<&InlineQuery> {
        self.update.inline_query.as_ref()
    }

    pub fn chat(&self) -> Option<&Chat> {
        self.update.chat()
    }

    /// Returns the user who caused this update.
    pub fn sender(&self) -> Option<&User> {
        self.update.sender()
    }

    /// Returns the text a trigger would be tested against: message text or
    /// caption, callback data, or inline query text.
    pub fn trigger_text(&self) -> Option<&str> {
        if let Some(message) = self.message() {
            return message.text_or_caption();
        }
        if let Some(query) = self.callback_query() {
            return query.data.as_deref();
        }
        self.inline_query().map(|q| q.query.as_str())
    }

    pub fn bot_username(&self) -> Option<&str> {
        self.bot_username.as_deref()
    }

    // ─── Outbound ────────────────────────────────────────────────────────────

    /// Returns the outbound-action capability.
    pub fn outbound(&self) -> &BoxedOutbound {
        &self.outbound
    }

    /// Sends `text` to the chat this update belongs to.
    pub async fn reply(&self, text: &str) -> ApiResult<Value> {
        let chat_id = self.chat().map(|c| c.id).ok_or(ApiError::MissingChat)?;
        self.outbound.send_message(chat_id, text).await
    }

    // ─── Scratch state ───────────────────────────────────────────────────────

    /// Returns a clone of the scratch-state value under `key`.
    pub fn state_get(&self, key: &str) -> Option<Value> {
        self.state.lock().get(key).cloned()
    }

    /// Stores a value in the scratch state, returning the previous one.
    pub fn state_set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.state.lock().insert(key.into(), value)
    }

    /// Shallow-merges `patch` into the scratch state.
    pub fn merge_state(&self, patch: Map<String, Value>) {
        self.state.lock().extend(patch);
    }

    /// Runs `f` with mutable access to the scratch state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        f(&mut self.state.lock())
    }

    // ─── Extensions ──────────────────────────────────────────────────────────

    /// Stores a typed value on this context.
    pub fn insert_extension<T: Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.extensions.lock().insert(value)
    }

    /// Retrieves a cloned typed value from this context.
    pub fn extension<T: Clone + 'static>(&self) -> Option<T> {
        self.extensions.lock().get::<T>().cloned()
    }

    /// Returns `true` if a value of type `T` is stored.
    pub fn has_extension<T: 'static>(&self) -> bool {
        self.extensions.lock().get::<T>().is_some()
    }

    /// Removes and returns a typed value.
    pub fn remove_extension<T: 'static>(&self) -> Option<T> {
        self.extensions.lock().remove::<T>()
    }

    /// Moves every value of `other` onto this context.
    pub fn extend_extensions(&self, other: Extensions) {
        self.extensions.lock().extend(other);
    }

    // ─── Named slots ─────────────────────────────────────────────────────────

    /// Binds `value` under `name`, replacing any previous binding.
    pub fn bind_slot(&self, name: impl Into<String>, value: SlotValue) {
        self.slots.lock().insert(name.into(), value);
    }

    /// Returns the value bound under `name`.
    pub fn slot(&self, name: &str) -> Option<SlotValue> {
        self.slots.lock().get(name).cloned()
    }

    /// Returns the value bound under `name` downcast to `T`.
    pub fn slot_as<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.slot(name).and_then(|v| v.downcast::<T>().ok())
    }

    // ─── Trigger match ───────────────────────────────────────────────────────

    /// Stores (or clears) the latest trigger match.
    pub fn set_match(&self, matched: Option<Match>) {
        *self.matched.lock() = matched;
    }

    /// Returns the latest trigger match.
    pub fn matched(&self) -> Option<Match> {
        self.matched.lock().clone()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("update_id", &self.update.update_id)
            .field("update_type", &self.update_type)
            .field("sub_types", &self.sub_types)
            .finish_non_exhaustive()
    }
}
