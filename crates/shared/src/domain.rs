use serde::{Deserialize, Serialize};

/// A contact as published by the users endpoint.
///
/// Every field is required. Unknown fields sent by the endpoint are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub username: String,
    pub email: String,
    pub phone: String,
}

impl User {
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }
}
