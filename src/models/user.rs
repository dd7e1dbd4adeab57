//! User records

use serde_json::Value;

use super::{int_field, str_field};

/// Default-tab memory for the UI. The only per-user state mutated
/// outside the message path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectedScreen {
    Owned,
    Joined,
    #[default]
    None,
}

impl SelectedScreen {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectedScreen::Owned => "owned",
            SelectedScreen::Joined => "joined",
            SelectedScreen::None => "none",
        }
    }

    /// Unknown values decode as `None`.
    pub fn parse(s: &str) -> Self {
        match s {
            "owned" => SelectedScreen::Owned,
            "joined" => SelectedScreen::Joined,
            _ => SelectedScreen::None,
        }
    }
}

/// A registered user. `push_token` is the device's current push-delivery
/// token; one per installation, replaced wholesale on rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub push_token: String,
    pub avatar_index: i64,
    pub selected_screen: SelectedScreen,
}

impl User {
    /// Decode a raw store document. Never fails; missing or mistyped
    /// fields default to their zero value.
    pub fn from_value(v: &Value) -> Self {
        Self {
            uid: str_field(v, "uid"),
            email: str_field(v, "email"),
            push_token: str_field(v, "fcmToken"),
            avatar_index: int_field(v, "avatarIndex"),
            selected_screen: SelectedScreen::parse(&str_field(v, "selectedScreen")),
        }
    }
}

/// Decode a batch-lookup response. Non-object entries are skipped.
pub fn decode_users(docs: &[Value]) -> Vec<User> {
    docs.iter()
        .filter(|v| v.is_object())
        .map(User::from_value)
        .collect()
}
