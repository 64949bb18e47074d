//! User profile model

use serde::{Deserialize, Serialize};

/// Placeholder name shown when a participant's profile cannot be resolved.
pub const UNKNOWN_USER_NAME: &str = "Unknown user";

/// Placeholder name for groups without a name.
pub const UNNAMED_GROUP_NAME: &str = "Group chat";

/// Avatar used when none is known.
pub const DEFAULT_AVATAR_URL: &str = "asset://avatars/default.png";

/// Public profile of a user, as stored in the `profiles` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    #[must_use]
    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    /// Display name, or the placeholder when blank.
    #[must_use]
    pub fn name_or_placeholder(&self) -> &str {
        let name = self.display_name.trim();
        if name.is_empty() {
            UNKNOWN_USER_NAME
        } else {
            name
        }
    }
}
