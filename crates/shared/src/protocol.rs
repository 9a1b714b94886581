use serde::{Deserialize, Serialize};

use crate::{domain::User, error::FetchError};

/// Lifecycle of a users fetch as published to observers.
///
/// Each transition replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded(Vec<User>),
    Failed(FetchError),
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// `Loaded` or `Failed`.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Loaded(_) | Self::Failed(_))
    }

    pub fn users(&self) -> Option<&[User]> {
        match self {
            Self::Loaded(users) => Some(users),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Loaded(_) => "loaded",
            Self::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;

    #[test]
    fn default_is_idle() {
        assert_eq!(LoadState::default(), LoadState::Idle);
        assert!(!LoadState::Idle.is_settled());
    }

    #[test]
    fn serializes_with_type_tag() {
        let state = LoadState::Loaded(vec![User::new("A", "a", "a@x.com", "1")]);
        let value = serde_json::to_value(&state).expect("serialize");
        assert_eq!(value["type"], "loaded");
        assert_eq!(value["payload"][0]["email"], "a@x.com");

        let failed = LoadState::Failed(FetchError::bare(FetchErrorKind::Transport));
        let value = serde_json::to_value(&failed).expect("serialize");
        assert_eq!(value["type"], "failed");
        assert_eq!(value["payload"]["kind"], "transport");
        assert!(value["payload"].get("message").is_none());

        let idle = serde_json::to_value(LoadState::Idle).expect("serialize");
        assert_eq!(idle["type"], "idle");
    }
}
