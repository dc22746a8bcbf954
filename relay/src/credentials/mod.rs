//! Per-user upload credentials: where a subject's files go and which bot puts
//! them there.

mod backend;
mod cache;
mod provider;

pub use backend::BackendCredentialSource;
pub use cache::CredentialCache;
pub use provider::{CredentialProvider, CredentialResolver, CredentialSource};

use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Bot token and destination channel issued by the backend for one subject.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    #[serde(rename = "channel_id", deserialize_with = "string_or_integer")]
    pub destination_channel_id: String,
    pub bot_token: String,
}

impl Credentials {
    pub fn new<C, T>(destination_channel_id: C, bot_token: T) -> Self
    where
        C: Into<String>,
        T: Into<String>,
    {
        Credentials {
            destination_channel_id: destination_channel_id.into(),
            bot_token: bot_token.into(),
        }
    }
}

// The bot token grants full control of the bot, keep it out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("destination_channel_id", &self.destination_channel_id)
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

// Channel ids are large negative integers; backends send them either as JSON
// numbers or as strings.
fn string_or_integer<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInteger {
        String(String),
        Integer(i64),
    }

    Ok(match StringOrInteger::deserialize(deserializer)? {
        StringOrInteger::String(s) => s,
        StringOrInteger::Integer(i) => i.to_string(),
    })
}

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("{detail} (HTTP {})", .status.as_u16())]
    Rejected { status: StatusCode, detail: String },
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("invalid credential payload: {0}")]
    InvalidPayload(String),
}
