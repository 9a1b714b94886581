//! Plain-text rendering of the contact list for each published state.

use shared::{domain::User, protocol::LoadState};

pub const TITLE: &str = "Contact List";

/// One contact block: name, username, phone and email on separate lines.
pub fn render_user(user: &User) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        user.name, user.username, user.phone, user.email
    )
}

pub fn render_state(state: &LoadState) -> String {
    let body = match state {
        LoadState::Idle => "Nothing loaded yet.".to_string(),
        LoadState::Loading => "Loading contacts...".to_string(),
        LoadState::Loaded(users) if users.is_empty() => "No contacts.".to_string(),
        LoadState::Loaded(users) => users
            .iter()
            .map(render_user)
            .collect::<Vec<_>>()
            .join("\n\n"),
        LoadState::Failed(err) => match err.message.as_deref() {
            Some(message) => format!("Failed to load contacts ({}): {message}", err.kind),
            None => format!("Failed to load contacts ({}).", err.kind),
        },
    };

    format!("{TITLE}\n{}\n{body}", "=".repeat(TITLE.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::error::{FetchError, FetchErrorKind};

    #[test]
    fn renders_users_in_received_order() {
        let state = LoadState::Loaded(vec![
            User::new("B", "b", "b@x.com", "2"),
            User::new("A", "a", "a@x.com", "1"),
        ]);

        assert_eq!(
            render_state(&state),
            "Contact List\n============\nB\nb\n2\nb@x.com\n\nA\na\n1\na@x.com"
        );
    }

    #[test]
    fn renders_loading_and_empty_states() {
        assert!(render_state(&LoadState::Loading).ends_with("Loading contacts..."));
        assert!(render_state(&LoadState::Loaded(Vec::new())).ends_with("No contacts."));
    }

    #[test]
    fn renders_error_kind_and_message() {
        let rendered = render_state(&LoadState::Failed(FetchError::decode("missing field")));
        assert!(rendered.ends_with("Failed to load contacts (decode): missing field"));

        let bare = render_state(&LoadState::Failed(FetchError::bare(FetchErrorKind::Transport)));
        assert!(bare.ends_with("Failed to load contacts (transport)."));
    }
}
