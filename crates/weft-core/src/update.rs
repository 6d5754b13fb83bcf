//! Update model for the weft framework.
//!
//! An [`Update`] mirrors the wire shape of a Telegram bot update: an
//! `update_id` plus exactly one payload field. Only the payloads that the
//! dispatch layer inspects are modelled; everything else is preserved
//! verbatim in the `extra` maps so nothing is lost on a round trip.
//!
//! # Classification
//!
//! Matchers filter on two levels of classification:
//!
//! - [`UpdateType`]: which payload the update carries (`message`,
//!   `callback_query`, ...).
//! - Message sub types: which content fields a message carries (`text`,
//!   `photo`, `sticker`, ...), see [`Message::sub_types`].
//!
//! ```rust,ignore
//! let update: Update = serde_json::from_str(raw)?;
//! assert_eq!(update.update_type(), UpdateType::Message);
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Update Type Classification
// ============================================================================

/// Classification of an update by the payload it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateType {
    /// A new incoming message.
    Message,
    /// A new version of a previously received message.
    EditedMessage,
    /// A new channel post.
    ChannelPost,
    /// A new version of a channel post.
    EditedChannelPost,
    /// A callback query from an inline keyboard button.
    CallbackQuery,
    /// An inline query.
    InlineQuery,
    /// Any payload this model does not know about.
    Other,
}

impl UpdateType {
    /// Returns the wire name of this update type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::ChannelPost => "channel_post",
            Self::EditedChannelPost => "edited_channel_post",
            Self::CallbackQuery => "callback_query",
            Self::InlineQuery => "inline_query",
            Self::Other => "other",
        }
    }
}

impl FromStr for UpdateType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "message" => Self::Message,
            "edited_message" => Self::EditedMessage,
            "channel_post" => Self::ChannelPost,
            "edited_channel_post" => Self::EditedChannelPost,
            "callback_query" => Self::CallbackQuery,
            "inline_query" => Self::InlineQuery,
            _ => Self::Other,
        })
    }
}

impl std::fmt::Display for UpdateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message content fields that count as sub types, besides `text`.
pub const MESSAGE_SUB_TYPES: &[&str] = &[
    "animation",
    "audio",
    "contact",
    "dice",
    "document",
    "left_chat_member",
    "location",
    "new_chat_members",
    "photo",
    "pinned_message",
    "poll",
    "sticker",
    "venue",
    "video",
    "video_note",
    "voice",
];

// ============================================================================
// Wire Types
// ============================================================================

/// A chat participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A private chat, group, supergroup or channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    /// One of `private`, `group`, `supergroup` or `channel`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Chat {
    /// Returns `true` for one-to-one chats with a user.
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }

    /// Returns `true` for groups and supergroups.
    pub fn is_group(&self) -> bool {
        self.kind == "group" || self.kind == "supergroup"
    }
}

/// An annotated sub-range of a message's text or caption.
///
/// `offset` and `length` are measured in UTF-16 code units, as on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntity {
    /// Entity type such as `mention`, `hashtag` or `bot_command`.
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl MessageEntity {
    /// Extracts the text this entity covers.
    ///
    /// Ranges that fall outside `text` are clamped rather than rejected.
    pub fn slice(&self, text: &str) -> String {
        let units: Vec<u16> = text.encode_utf16().collect();
        let start = self.offset.min(units.len());
        let end = self.offset.saturating_add(self.length).min(units.len());
        String::from_utf16_lossy(&units[start..end])
    }
}

/// A message, channel post, or an edited version of either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<MessageEntity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caption_entities: Vec<MessageEntity>,
    /// Every other field of the message, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Returns the text, falling back to the caption for media messages.
    pub fn text_or_caption(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// Returns the entities annotating [`text_or_caption`](Self::text_or_caption).
    pub fn entities_or_caption_entities(&self) -> &[MessageEntity] {
        if self.text.is_some() {
            &self.entities
        } else {
            &self.caption_entities
        }
    }

    /// Returns the content sub types present on this message.
    pub fn sub_types(&self) -> Vec<&'static str> {
        let mut types = Vec::new();
        if self.text.is_some() {
            types.push("text");
        }
        types.extend(
            MESSAGE_SUB_TYPES
                .iter()
                .copied()
                .filter(|name| self.extra.contains_key(*name)),
        );
        types
    }
}

/// A callback query from a button in an inline keyboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// An incoming inline query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub offset: String,
}

// ============================================================================
// Update
// ============================================================================

/// One inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_post: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_channel_post: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_query: Option<InlineQuery>,
    /// Payloads this model does not know about, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Update {
    /// Returns the payload classification of this update.
    pub fn update_type(&self) -> UpdateType {
        if self.message.is_some() {
            UpdateType::Message
        } else if self.edited_message.is_some() {
            UpdateType::EditedMessage
        } else if self.channel_post.is_some() {
            UpdateType::ChannelPost
        } else if self.edited_channel_post.is_some() {
            UpdateType::EditedChannelPost
        } else if self.callback_query.is_some() {
            UpdateType::CallbackQuery
        } else if self.inline_query.is_some() {
            UpdateType::InlineQuery
        } else {
            UpdateType::Other
        }
    }

    /// Returns the wire name of the payload, including unknown payloads.
    pub fn type_name(&self) -> &str {
        match self.update_type() {
            UpdateType::Other => self.extra.keys().next().map_or("other", String::as_str),
            known => known.as_str(),
        }
    }

    /// Returns whichever message-shaped payload this update carries.
    pub fn any_message(&self) -> Option<&Message> {
        self.message
            .as_ref()
            .or(self.edited_message.as_ref())
            .or(self.channel_post.as_ref())
            .or(self.edited_channel_post.as_ref())
    }

    /// Returns the chat this update belongs to, if any.
    pub fn chat(&self) -> Option<&Chat> {
        self.any_message()
            .or_else(|| self.callback_query.as_ref()?.message.as_ref())
            .map(|m| &m.chat)
    }

    /// Returns the user who caused this update, if any.
    pub fn sender(&self) -> Option<&User> {
        if let Some(query) = &self.callback_query {
            return Some(&query.from);
        }
        if let Some(query) = &self.inline_query {
            return Some(&query.from);
        }
        self.any_message()?.from.as_ref()
    }

    /// Returns the message sub types, or nothing for non-message updates.
    pub fn sub_types(&self) -> Vec<&'static str> {
        self.any_message().map(Message::sub_types).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classifies_text_message() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": { "id": 7, "first_name": "Ann" },
                "chat": { "id": 42, "type": "private" },
                "text": "hello"
            }
        }))
        .unwrap();

        assert_eq!(update.update_type(), UpdateType::Message);
        assert_eq!(update.sub_types(), vec!["text"]);
        assert_eq!(update.chat().map(|c| c.id), Some(42));
        assert_eq!(update.sender().map(|u| u.id), Some(7));
    }

    #[test]
    fn test_unknown_payload_is_preserved() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 2,
            "poll_answer": { "poll_id": "p" }
        }))
        .unwrap();

        assert_eq!(update.update_type(), UpdateType::Other);
        assert_eq!(update.type_name(), "poll_answer");
        assert!(update.chat().is_none());
    }

    #[test]
    fn test_media_sub_types_come_from_extra_fields() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 3,
            "message": {
                "message_id": 1,
                "chat": { "id": 1, "type": "group" },
                "caption": "look",
                "photo": [{ "file_id": "x" }]
            }
        }))
        .unwrap();

        assert_eq!(update.sub_types(), vec!["photo"]);
        let message = update.message.unwrap();
        assert_eq!(message.text_or_caption(), Some("look"));
        assert!(message.chat.is_group());
    }

    #[test]
    fn test_sub_type_list_is_public() {
        assert!(crate::MESSAGE_SUB_TYPES.contains(&"photo"));
        assert!(!crate::MESSAGE_SUB_TYPES.contains(&"text"));
    }

    #[test]
    fn test_entity_slice_uses_utf16_offsets() {
        // The emoji occupies two UTF-16 code units.
        let text = "😀 #tag";
        let entity = MessageEntity {
            kind: "hashtag".into(),
            offset: 3,
            length: 4,
            url: None,
            user: None,
        };
        assert_eq!(entity.slice(text), "#tag");
    }

    #[test]
    fn test_entity_slice_clamps_huge_offsets() {
        let entity = MessageEntity {
            kind: "hashtag".into(),
            offset: usize::MAX,
            length: 4,
            url: None,
            user: None,
        };
        assert_eq!(entity.slice("#foo"), "");

        let entity = MessageEntity {
            offset: 1,
            length: usize::MAX,
            ..entity
        };
        assert_eq!(entity.slice("#foo"), "foo");
    }
}
