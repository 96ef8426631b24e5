use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub const DEFAULT_DISPLAY_NAME: &str = "SIN_NOMBRE";
const SEGMENT_DELIMITER: char = '_';

/// Client identifier (cédula): the all-digit leading segment of a filename.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct ClientKey(String);

impl ClientKey {
    /// Accepts trimmed, non-empty, ASCII-digit-only values.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit()) {
            Some(Self(value.to_string()))
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Identity {
    Client {
        client_key: ClientKey,
        display_name: String,
    },
    Shared,
}

/// Decide whether a filename belongs to one client or is shared by all of them.
///
/// The name is split on `_`; it is client-scoped when the first segment is all
/// digits. The display name is the trimmed second segment, kept as written, or
/// [`DEFAULT_DISPLAY_NAME`] when there is no second segment.
#[must_use]
pub fn parse_identity(file_name: &str) -> Identity {
    let mut segments = file_name.split(SEGMENT_DELIMITER);
    let Some(client_key) = segments.next().and_then(ClientKey::parse) else {
        return Identity::Shared;
    };

    let display_name = match segments.next() {
        Some(segment) => segment.trim().to_string(),
        None => DEFAULT_DISPLAY_NAME.to_string(),
    };

    Identity::Client {
        client_key,
        display_name,
    }
}
