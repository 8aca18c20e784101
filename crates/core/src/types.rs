use serde::{Deserialize, Serialize};

/// Identity of the end user a command is issued on behalf of
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    /// Username the client claims
    pub username: String,
    /// Whether the claim has been validated with the identity provider
    pub username_validated: bool,
}

impl AuthInfo {
    /// A claimed, not yet validated, username
    pub fn claimed(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            username_validated: false,
        }
    }

    /// A username validated with the identity provider
    pub fn validated(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            username_validated: true,
        }
    }

    /// Form value sent to the backend in the `authenticated` field
    pub fn authenticated_flag(&self) -> &'static str {
        if self.username_validated {
            "1"
        } else {
            "0"
        }
    }
}
