//! Protocol-agnostic frame type handed to listeners.

use tokio_tungstenite::tungstenite::Message;

/// A received or outbound WebSocket frame.
///
/// Control frames (ping/pong) are answered by the connector itself and are
/// not fanned out to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    /// Converts an inbound wire message. Raw protocol frames map to `None`.
    pub(crate) fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self::Text(text.to_string())),
            Message::Binary(data) => Some(Self::Binary(data.to_vec())),
            Message::Ping(data) => Some(Self::Ping(data.to_vec())),
            Message::Pong(data) => Some(Self::Pong(data.to_vec())),
            Message::Close(_) => Some(Self::Close),
            Message::Frame(_) => None,
        }
    }

    pub(crate) fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text.into()),
            Self::Binary(data) => Message::Binary(data.into()),
            Self::Ping(data) => Message::Ping(data.into()),
            Self::Pong(data) => Message::Pong(data.into()),
            Self::Close => Message::Close(None),
        }
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}
