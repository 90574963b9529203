use serde::{Deserialize, Serialize};

/// Suffix an email must end with for the record to be forwarded.
pub const DEFAULT_TARGET_SUFFIX: &str = ".biz";

/// One user as served by the source endpoint. Extra fields are ignored.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub email: String,
}

impl UserRecord {
    #[cfg(test)]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn is_target(&self, suffix: &str) -> bool {
        is_target(&self.email, suffix)
    }
}

/// Case-sensitive suffix match on the email address.
pub fn is_target(email: &str, suffix: &str) -> bool {
    email.ends_with(suffix)
}
