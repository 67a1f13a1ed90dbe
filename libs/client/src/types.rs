use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        body: String,
    },
    Media {
        url: String,
    },
    Document {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
    Contact {
        phone: String,
        name: String,
        vcard: String,
    },
}

impl MessageContent {
    pub fn text(body: impl Into<String>) -> Self {
        MessageContent::Text { body: body.into() }
    }

    pub fn media(url: impl Into<String>) -> Self {
        MessageContent::Media { url: url.into() }
    }

    pub fn document(url: impl Into<String>, file_name: Option<String>) -> Self {
        MessageContent::Document {
            url: url.into(),
            file_name,
        }
    }

    /// A contact card for `phone`, rendered as a vCard 3.0 the client can attach.
    pub fn contact_card(phone: impl Into<String>, name: impl Into<String>) -> Self {
        let phone = phone.into();
        let name = name.into();
        let vcard = render_vcard(&phone, &name);
        MessageContent::Contact { phone, name, vcard }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MessageContent::Text { .. } => "text",
            MessageContent::Media { .. } => "media",
            MessageContent::Document { .. } => "document",
            MessageContent::Contact { .. } => "contact",
        }
    }
}

fn render_vcard(phone: &str, name: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    format!(
        "BEGIN:VCARD\nVERSION:3.0\nFN:{name}\nTEL;type=CELL;type=VOICE;waid={digits}:+{digits}\nEND:VCARD"
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl SendOptions {
    pub fn with_caption(caption: Option<String>) -> Self {
        Self { caption }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Anything else the client reports, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pushname: Option<String>,
    #[serde(default)]
    pub is_my_contact: bool,
    #[serde(default)]
    pub is_business: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub has_media: bool,
}

/// Why the client lost its session. Anything other than `LOGOUT` is treated
/// as transient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DisconnectReason {
    Logout,
    Other(String),
}

impl DisconnectReason {
    pub fn is_logout(&self) -> bool {
        matches!(self, DisconnectReason::Logout)
    }

    pub fn as_str(&self) -> &str {
        match self {
            DisconnectReason::Logout => "LOGOUT",
            DisconnectReason::Other(reason) => reason,
        }
    }
}

impl From<String> for DisconnectReason {
    fn from(value: String) -> Self {
        if value == "LOGOUT" {
            DisconnectReason::Logout
        } else {
            DisconnectReason::Other(value)
        }
    }
}

impl From<&str> for DisconnectReason {
    fn from(value: &str) -> Self {
        DisconnectReason::from(value.to_string())
    }
}

impl From<DisconnectReason> for String {
    fn from(value: DisconnectReason) -> Self {
        match value {
            DisconnectReason::Logout => "LOGOUT".to_string(),
            DisconnectReason::Other(reason) => reason,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A pairing code is waiting to be scanned.
    Qr { code: String },
    Ready,
    Disconnected { reason: DisconnectReason },
    Message(IncomingMessage),
}
