//! Conversation model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::timestamp::{normalize_optional, RemoteTimestamp, Timestamp};
use crate::error::{Error, Result};

/// Per-conversation permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSettings {
    #[serde(default = "default_true")]
    pub allow_invites: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub only_admins_can_message: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            allow_invites: true,
            muted: false,
            only_admins_can_message: false,
        }
    }
}

/// Summary of the latest message, used for list previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub timestamp: Timestamp,
}

/// A direct or group conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub group_avatar: Option<String>,
    pub created_by: String,
    pub last_message: Option<LastMessage>,
    pub unread_counts: BTreeMap<String, u32>,
    pub settings: ConversationSettings,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Conversation {
    /// A two-participant conversation started by `creator`.
    pub fn direct(creator: impl Into<String>, other: impl Into<String>) -> Result<Self> {
        let creator = creator.into();
        let other = other.into();
        if creator.trim().is_empty() || other.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Direct conversation participants cannot be empty".to_string(),
            ));
        }
        if creator == other {
            return Err(Error::InvalidInput(
                "Direct conversation needs two distinct participants".to_string(),
            ));
        }
        Ok(Self::build(creator.clone(), vec![creator, other], false, None))
    }

    /// A group conversation; `creator` is always a participant.
    pub fn group(
        creator: impl Into<String>,
        name: impl Into<String>,
        members: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        let creator = creator.into();
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Group name cannot be empty".to_string(),
            ));
        }

        let mut participants = vec![creator.clone()];
        for member in members {
            let member = member.trim().to_string();
            if !member.is_empty() && !participants.contains(&member) {
                participants.push(member);
            }
        }
        if participants.len() < 2 {
            return Err(Error::InvalidInput(
                "Group needs at least one member besides the creator".to_string(),
            ));
        }
        Ok(Self::build(creator, participants, true, Some(name)))
    }

    fn build(
        created_by: String,
        participants: Vec<String>,
        is_group: bool,
        group_name: Option<String>,
    ) -> Self {
        let now = Timestamp::now();
        let unread_counts = participants.iter().map(|id| (id.clone(), 0)).collect();
        Self {
            id: Uuid::now_v7().to_string(),
            participants,
            is_group,
            group_name,
            group_avatar: None,
            created_by,
            last_message: None,
            unread_counts,
            settings: ConversationSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The first participant that is not `user_id`.
    #[must_use]
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        self.participants
            .iter()
            .map(String::as_str)
            .find(|participant| *participant != user_id)
    }

    #[must_use]
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|participant| participant == user_id)
    }

    #[must_use]
    pub fn unread_for(&self, user_id: &str) -> u32 {
        self.unread_counts.get(user_id).copied().unwrap_or(0)
    }

    /// Time of the most recent activity, for list ordering.
    #[must_use]
    pub fn last_activity(&self) -> Timestamp {
        self.last_message
            .as_ref()
            .map_or(self.updated_at, |last| last.timestamp)
    }

    /// Record `last` as the latest message and bump every other participant's
    /// unread counter.
    pub fn apply_last_message(&mut self, last: LastMessage) {
        for participant in &self.participants {
            if *participant != last.sender_id {
                let counter = self.unread_counts.entry(participant.clone()).or_insert(0);
                *counter = counter.saturating_add(1);
            }
        }
        self.updated_at = last.timestamp.max(self.updated_at);
        self.last_message = Some(last);
    }
}

/// Last-message summary as stored in a remote document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageDocument {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub timestamp: Option<RemoteTimestamp>,
}

/// A conversation document as it arrives from the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDocument {
    pub id: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub group_avatar: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub last_message: Option<LastMessageDocument>,
    #[serde(default)]
    pub unread_counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub settings: ConversationSettings,
    #[serde(default)]
    pub created_at: Option<RemoteTimestamp>,
    #[serde(default)]
    pub updated_at: Option<RemoteTimestamp>,
}

impl From<ConversationDocument> for Conversation {
    fn from(doc: ConversationDocument) -> Self {
        let created_at = normalize_optional(doc.created_at.as_ref());
        let updated_at = doc
            .updated_at
            .as_ref()
            .map_or(created_at, RemoteTimestamp::normalize);
        Self {
            id: doc.id,
            participants: doc.participants,
            is_group: doc.is_group,
            group_name: doc.group_name,
            group_avatar: doc.group_avatar,
            created_by: doc.created_by,
            last_message: doc.last_message.map(|last| LastMessage {
                id: last.id,
                content: last.content,
                sender_id: last.sender_id,
                timestamp: normalize_optional(last.timestamp.as_ref()),
            }),
            unread_counts: doc.unread_counts,
            settings: doc.settings,
            created_at,
            updated_at,
        }
    }
}

impl From<&Conversation> for ConversationDocument {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            participants: conversation.participants.clone(),
            is_group: conversation.is_group,
            group_name: conversation.group_name.clone(),
            group_avatar: conversation.group_avatar.clone(),
            created_by: conversation.created_by.clone(),
            last_message: conversation
                .last_message
                .as_ref()
                .map(|last| LastMessageDocument {
                    id: last.id.clone(),
                    content: last.content.clone(),
                    sender_id: last.sender_id.clone(),
                    timestamp: Some(last.timestamp.into()),
                }),
            unread_counts: conversation.unread_counts.clone(),
            settings: conversation.settings.clone(),
            created_at: Some(conversation.created_at.into()),
            updated_at: Some(conversation.updated_at.into()),
        }
    }
}

/// Display-ready row for the conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPreview {
    pub id: String,
    pub is_group: bool,
    pub name: String,
    pub avatar_url: Option<String>,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    pub last_activity: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_requires_distinct_participants() {
        assert!(Conversation::direct("alice", "alice").is_err());
        assert!(Conversation::direct("alice", " ").is_err());

        let conversation = Conversation::direct("alice", "bob").unwrap();
        assert!(!conversation.is_group);
        assert_eq!(conversation.participants, vec!["alice", "bob"]);
        assert_eq!(conversation.other_participant("alice"), Some("bob"));
        assert_eq!(conversation.unread_for("bob"), 0);
    }

    #[test]
    fn test_group_dedupes_members_and_includes_creator() {
        let conversation = Conversation::group(
            "alice",
            "Hikers",
            vec!["bob".to_string(), "alice".to_string(), "bob".to_string()],
        )
        .unwrap();
        assert!(conversation.is_group);
        assert_eq!(conversation.participants, vec!["alice", "bob"]);
        assert_eq!(conversation.group_name.as_deref(), Some("Hikers"));

        assert!(Conversation::group("alice", "Solo", Vec::new()).is_err());
        assert!(Conversation::group("alice", " ", vec!["bob".to_string()]).is_err());
    }

    #[test]
    fn test_apply_last_message_bumps_other_participants() {
        let mut conversation =
            Conversation::group("alice", "Trio", vec!["bob".into(), "carol".into()]).unwrap();
        conversation.apply_last_message(LastMessage {
            id: "m1".to_string(),
            content: "hey".to_string(),
            sender_id: "alice".to_string(),
            timestamp: Timestamp::from_millis(i64::MAX / 2),
        });

        assert_eq!(conversation.unread_for("alice"), 0);
        assert_eq!(conversation.unread_for("bob"), 1);
        assert_eq!(conversation.unread_for("carol"), 1);
        assert_eq!(conversation.last_activity(), Timestamp::from_millis(i64::MAX / 2));
    }

    #[test]
    fn test_document_roundtrip_preserves_fields() {
        let mut conversation = Conversation::direct("alice", "bob").unwrap();
        conversation.apply_last_message(LastMessage {
            id: "m1".to_string(),
            content: "hey".to_string(),
            sender_id: "alice".to_string(),
            timestamp: Timestamp::from_millis(1_000),
        });

        let doc = ConversationDocument::from(&conversation);
        let restored = Conversation::from(doc);
        assert_eq!(restored, conversation);
    }
}
