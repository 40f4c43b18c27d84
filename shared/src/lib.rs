use serde::{Deserialize, Serialize};
use std::fmt;

pub mod codec;

pub use codec::{
    decode_challenge_response, decode_info_response, decode_player_list_response, decode_request,
    encode_challenge_request, encode_challenge_response, encode_info_query, encode_info_response,
    encode_player_list_response, encode_player_request, Request,
};

/// Every query and response starts with this prefix (single-packet responses only).
pub const PACKET_MAGIC: u32 = 0xFFFF_FFFF;
pub const INFO_QUERY_HEADER: u8 = 0x54;
pub const INFO_RESPONSE_HEADER: u8 = 0x49;
pub const PLAYER_REQUEST_HEADER: u8 = 0x55;
pub const CHALLENGE_RESPONSE_HEADER: u8 = 0x41;
pub const PLAYER_RESPONSE_HEADER: u8 = 0x44;
pub const INFO_QUERY_PAYLOAD: &str = "Source Engine Query";
/// Challenge value sent when asking the server for a fresh token.
pub const CHALLENGE_PLACEHOLDER: u32 = 0xFFFF_FFFF;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerInfo {
    /// Server-supplied slot index. Many servers always send 0, so this is
    /// never used for ordering.
    pub index: u8,
    pub name: String,
    pub score: u32,
    /// Seconds connected.
    pub duration: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ServerInfo {
    pub name: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub id: u16,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
    pub server_type: u8,
    pub environment: u8,
    pub visibility: u8,
    pub vac: u8,
    /// Empty until the player-list step of a cycle completes.
    pub player_list: Vec<PlayerInfo>,
}

/// What the consumer sees after each poll cycle.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub enum ServerStatus {
    #[default]
    Pending,
    Ok(ServerInfo),
    Error(String),
}

impl ServerStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ServerStatus::Ok(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServerStatus::Error(_))
    }

    /// Short text for an icon overlay: the player count, or a marker.
    pub fn badge(&self) -> String {
        match self {
            ServerStatus::Ok(info) => info.players.to_string(),
            ServerStatus::Pending => "?".to_string(),
            ServerStatus::Error(_) => "!".to_string(),
        }
    }

    /// One-line summary suitable for a tooltip.
    pub fn tooltip(&self) -> String {
        match self {
            ServerStatus::Ok(info) => format!(
                "{} — {} ({}/{})",
                info.name, info.map, info.players, info.max_players
            ),
            ServerStatus::Pending => "Querying server…".to_string(),
            ServerStatus::Error(message) => format!("Error: {}", message),
        }
    }
}

/// Reasons a datagram could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    BadMagic { found: u32 },
    BadHeader { expected: u8, found: u8 },
    /// Right header, but the body is not what that request kind carries.
    BadPayload { header: u8 },
    Truncated { field: &'static str },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic { found } => {
                write!(f, "bad magic: expected 0xFFFFFFFF, got {:#010X}", found)
            }
            Self::BadHeader { expected, found } => write!(
                f,
                "bad header: expected {:#04X}, got {:#04X}",
                expected, found
            ),
            Self::BadPayload { header } => write!(f, "bad payload for request {:#04X}", header),
            Self::Truncated { field } => write!(f, "truncated packet while reading {}", field),
        }
    }
}

impl std::error::Error for DecodeError {}
