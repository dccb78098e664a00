//! Process-unique session identity.

use std::fmt;

use chrono::Utc;
use uuid::Uuid;

/// Opaque token naming this client's channel on the service.
///
/// Generated once at startup and never reused: the millisecond timestamp
/// keeps ids sortable in service logs, the random suffix keeps two clients
/// started in the same millisecond apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    const PREFIX: &'static str = "session";
    const SUFFIX_LEN: usize = 9;

    pub fn generate() -> Self {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(Self::SUFFIX_LEN)
            .collect();
        Self(format!(
            "{}_{}_{}",
            Self::PREFIX,
            Utc::now().timestamp_millis(),
            suffix
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
