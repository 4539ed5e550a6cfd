use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Attributes a patch never overrides, even when the server echoes them back.
const SERVER_OWNED: [&str; 2] = ["id", "created_at"];

/// Profile of the signed-in user as returned by the profile endpoint.
///
/// Attributes the client does not model are kept in `extra` so a profile
/// survives a round trip through local state unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    /// Server identifier of the user.
    pub id: i64,

    /// The user's email address.
    #[serde(default)]
    pub email: String,

    /// The user's username.
    #[serde(default)]
    pub username: String,

    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Optional avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    /// Preferred UI theme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    /// Preferred currency code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_currency: Option<String>,

    /// When the account was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// Overwrites the attributes present in `patch`, leaving the rest untouched.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        if let Some(email) = &patch.email {
            self.email.clone_from(email);
        }
        if let Some(username) = &patch.username {
            self.username.clone_from(username);
        }
        if let Some(display_name) = &patch.display_name {
            self.display_name.clone_from(display_name);
        }
        if let Some(avatar) = &patch.avatar {
            self.avatar.clone_from(avatar);
        }
        if let Some(theme) = &patch.theme {
            self.theme.clone_from(theme);
        }
        if let Some(default_currency) = &patch.default_currency {
            self.default_currency.clone_from(default_currency);
        }
        for (key, value) in &patch.extra {
            if !SERVER_OWNED.contains(&key.as_str()) {
                self.extra.insert(key.clone(), value.clone());
            }
        }
    }

    /// Best name to show for the user.
    #[must_use]
    pub fn label(&self) -> String {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| Some(self.username.as_str()).filter(|name| !name.is_empty()))
            .or_else(|| Some(self.email.as_str()).filter(|email| !email.is_empty()))
            .map_or_else(|| format!("user #{}", self.id), str::to_owned)
    }
}

/// Partial profile update. Only the attributes that are set are sent and merged.
///
/// Optional attributes distinguish absent (`None`) from an explicit `null`
/// (`Some(None)`), which clears the attribute.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub theme: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_currency: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A present attribute, `null` included. Absent attributes fall back to `default`.
fn nullable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl ProfilePatch {
    /// Whether the patch carries no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.username.is_none()
            && self.display_name.is_none()
            && self.avatar.is_none()
            && self.theme.is_none()
            && self.default_currency.is_none()
            && self.extra.is_empty()
    }
}
