use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Detail the API reports when a refresh token is rejected.
pub const TOKEN_INVALID_DETAIL: &str = "Token is invalid or expired";

/// Detail the API reports when an access token is rejected.
pub const TOKEN_NOT_VALID_DETAIL: &str = "Given token not valid for any token type";

/// Field key used by the API for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

const MESSAGE_KEYS: [&str; 3] = ["message", "detail", "error"];
const IGNORED_KEYS: [&str; 2] = ["code", "messages"];

/// Normalized error payload stored in user-facing state.
///
/// Every failed call is reduced to one of these shapes before it reaches the
/// session state, so consumers never inspect raw response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ErrorPayload {
    /// A single human readable message.
    Message(String),
    /// Validation messages keyed by field name.
    FieldErrors(BTreeMap<String, Vec<String>>),
    /// The server gave no usable detail.
    Empty,
}

impl ErrorPayload {
    /// Creates a message payload.
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }

    /// Normalizes a response body into a payload.
    ///
    /// A string `message`, `detail` or `error` member wins. Otherwise every
    /// member holding a string or an array of strings becomes a field error.
    #[must_use]
    pub fn from_body(body: &Value) -> Self {
        match body {
            Value::Object(map) => {
                for key in MESSAGE_KEYS {
                    if let Some(Value::String(text)) = map.get(key) {
                        if !text.trim().is_empty() {
                            return Self::Message(text.clone());
                        }
                    }
                }

                let fields: BTreeMap<String, Vec<String>> = map
                    .iter()
                    .filter(|(field, _)| !IGNORED_KEYS.contains(&field.as_str()))
                    .filter_map(|(field, value)| {
                        let messages = field_messages(value);
                        (!messages.is_empty()).then(|| (field.clone(), messages))
                    })
                    .collect();

                if fields.is_empty() {
                    Self::Empty
                } else {
                    Self::FieldErrors(fields)
                }
            }
            Value::Array(items) => items
                .iter()
                .find_map(Value::as_str)
                .map_or(Self::Empty, |text| Self::Message(text.to_owned())),
            Value::String(text) if !text.trim().is_empty() => Self::Message(text.clone()),
            _ => Self::Empty,
        }
    }

    /// Replaces an empty payload with the given fallback message.
    #[must_use]
    pub fn or_message(self, fallback: &str) -> Self {
        match self {
            Self::Empty => Self::Message(fallback.to_owned()),
            other => other,
        }
    }

    /// Renders the payload for display, using `fallback` when nothing usable exists.
    ///
    /// Field errors prefer `non_field_errors`, then the first field in key order.
    #[must_use]
    pub fn display_or(&self, fallback: &str) -> String {
        match self {
            Self::Message(text) => text.clone(),
            Self::FieldErrors(fields) => fields
                .get(NON_FIELD_ERRORS)
                .and_then(|messages| messages.first())
                .or_else(|| fields.values().find_map(|messages| messages.first()))
                .cloned()
                .unwrap_or_else(|| fallback.to_owned()),
            Self::Empty => fallback.to_owned(),
        }
    }

    /// Returns the first message recorded for `field`.
    #[must_use]
    pub fn field_error(&self, field: &str) -> Option<&str> {
        match self {
            Self::FieldErrors(fields) => fields
                .get(field)
                .and_then(|messages| messages.first())
                .map(String::as_str),
            _ => None,
        }
    }

    /// Whether the payload reports an invalid or expired token.
    #[must_use]
    pub fn is_token_invalid(&self) -> bool {
        matches!(self, Self::Message(text) if text == TOKEN_INVALID_DETAIL || text == TOKEN_NOT_VALID_DETAIL)
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_or("no error details"))
    }
}

impl std::error::Error for ErrorPayload {}

fn field_messages(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) => vec![text.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}
