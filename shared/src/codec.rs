//! Byte-exact encoders and decoders for the A2S info / player query exchange
//!
//! The client side needs four request encoders and three response decoders.
//! The matching server side (request decoder, response encoders) lives here
//! too so the test-double server and the client can never drift apart.
//!
//! Layout notes:
//! - Info responses carry the numeric tail (`id` onward) big-endian.
//! - Challenge and player-list packets are little-endian throughout.
//! - Strings are zero-terminated; a missing terminator is a truncation.

use crate::{
    DecodeError, PlayerInfo, ServerInfo, CHALLENGE_PLACEHOLDER, CHALLENGE_RESPONSE_HEADER,
    INFO_QUERY_HEADER, INFO_QUERY_PAYLOAD, INFO_RESPONSE_HEADER, PACKET_MAGIC,
    PLAYER_REQUEST_HEADER, PLAYER_RESPONSE_HEADER,
};
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Protocol version written into info responses by the server-side encoder.
const PROTOCOL_VERSION: u8 = 17;

/// A request as seen by a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Info,
    Challenge,
    Players { challenge: u32 },
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Cursor over a received datagram that maps every short read to `Truncated`.
struct PacketReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> PacketReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        self.cursor
            .read_u8()
            .map_err(|_| DecodeError::Truncated { field })
    }

    fn u16_be(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| DecodeError::Truncated { field })
    }

    fn u32_le(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| DecodeError::Truncated { field })
    }

    fn f32_le(&mut self, field: &'static str) -> Result<f32, DecodeError> {
        self.cursor
            .read_f32::<LittleEndian>()
            .map_err(|_| DecodeError::Truncated { field })
    }

    /// Reads up to (and consumes) the next zero byte.
    fn cstring(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let data = *self.cursor.get_ref();
        let start = (self.cursor.position() as usize).min(data.len());
        let rest = &data[start..];

        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::Truncated { field })?;

        self.cursor.set_position((start + end + 1) as u64);
        Ok(String::from_utf8_lossy(&rest[..end]).into_owned())
    }

    fn magic(&mut self) -> Result<(), DecodeError> {
        let found = self.u32_le("magic")?;
        if found != PACKET_MAGIC {
            return Err(DecodeError::BadMagic { found });
        }
        Ok(())
    }

    fn header(&mut self, expected: u8) -> Result<(), DecodeError> {
        let found = self.u8("header")?;
        if found != expected {
            return Err(DecodeError::BadHeader { expected, found });
        }
        Ok(())
    }
}

/// Decodes an info (`0x49`) response. The player list is left empty.
pub fn decode_info_response(data: &[u8]) -> Result<ServerInfo, DecodeError> {
    let mut reader = PacketReader::new(data);
    reader.magic()?;
    reader.header(INFO_RESPONSE_HEADER)?;
    reader.u8("protocol")?;

    Ok(ServerInfo {
        name: reader.cstring("name")?,
        map: reader.cstring("map")?,
        folder: reader.cstring("folder")?,
        game: reader.cstring("game")?,
        id: reader.u16_be("id")?,
        players: reader.u8("players")?,
        max_players: reader.u8("max_players")?,
        bots: reader.u8("bots")?,
        server_type: reader.u8("server_type")?,
        environment: reader.u8("environment")?,
        visibility: reader.u8("visibility")?,
        vac: reader.u8("vac")?,
        player_list: Vec::new(),
    })
}

/// Decodes a challenge (`0x41`) response and returns the token.
pub fn decode_challenge_response(data: &[u8]) -> Result<u32, DecodeError> {
    let mut reader = PacketReader::new(data);
    // Only the length of the prefix is checked here.
    reader.u32_le("magic")?;
    reader.header(CHALLENGE_RESPONSE_HEADER)?;
    reader.u32_le("challenge")
}

/// Decodes a player-list (`0x44`) response, keeping records in receipt order.
pub fn decode_player_list_response(data: &[u8]) -> Result<Vec<PlayerInfo>, DecodeError> {
    let mut reader = PacketReader::new(data);
    reader.u32_le("magic")?;
    reader.header(PLAYER_RESPONSE_HEADER)?;
    let count = reader.u8("player_count")?;

    let mut players = Vec::with_capacity(count as usize);
    for _ in 0..count {
        players.push(PlayerInfo {
            index: reader.u8("player_index")?,
            name: reader.cstring("player_name")?,
            score: reader.u32_le("player_score")?,
            duration: reader.f32_le("player_duration")?,
        });
    }

    Ok(players)
}

/// Classifies an incoming query on the server side.
pub fn decode_request(data: &[u8]) -> Result<Request, DecodeError> {
    let mut reader = PacketReader::new(data);
    reader.magic()?;

    match reader.u8("header")? {
        INFO_QUERY_HEADER => {
            let payload = reader.cstring("payload")?;
            if payload != INFO_QUERY_PAYLOAD {
                return Err(DecodeError::BadPayload {
                    header: INFO_QUERY_HEADER,
                });
            }
            Ok(Request::Info)
        }
        PLAYER_REQUEST_HEADER => match reader.u32_le("challenge")? {
            CHALLENGE_PLACEHOLDER => Ok(Request::Challenge),
            challenge => Ok(Request::Players { challenge }),
        },
        found => Err(DecodeError::BadHeader {
            expected: INFO_QUERY_HEADER,
            found,
        }),
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Growable packet buffer mirroring `PacketReader`.
struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    fn new(header: u8) -> Self {
        let mut writer = Self {
            buf: Vec::with_capacity(64),
        };
        writer.u32_le(PACKET_MAGIC);
        writer.u8(header);
        writer
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u16_be(&mut self, value: u16) {
        let mut bytes = [0u8; 2];
        BigEndian::write_u16(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    fn u32_le(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    fn f32_le(&mut self, value: f32) {
        let mut bytes = [0u8; 4];
        LittleEndian::write_f32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    /// Interior zero bytes would end the string early on the reading side,
    /// so they are dropped.
    fn cstring(&mut self, value: &str) {
        self.buf
            .extend(value.as_bytes().iter().copied().filter(|&b| b != 0));
        self.buf.push(0);
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// The fixed 25-byte info query.
pub fn encode_info_query() -> Vec<u8> {
    let mut writer = PacketWriter::new(INFO_QUERY_HEADER);
    writer.cstring(INFO_QUERY_PAYLOAD);
    writer.finish()
}

/// Player request carrying the placeholder token, which asks for a challenge.
pub fn encode_challenge_request() -> Vec<u8> {
    encode_player_request(CHALLENGE_PLACEHOLDER)
}

pub fn encode_player_request(challenge: u32) -> Vec<u8> {
    let mut writer = PacketWriter::new(PLAYER_REQUEST_HEADER);
    writer.u32_le(challenge);
    writer.finish()
}

pub fn encode_info_response(info: &ServerInfo) -> Vec<u8> {
    let mut writer = PacketWriter::new(INFO_RESPONSE_HEADER);
    writer.u8(PROTOCOL_VERSION);
    writer.cstring(&info.name);
    writer.cstring(&info.map);
    writer.cstring(&info.folder);
    writer.cstring(&info.game);
    writer.u16_be(info.id);
    writer.u8(info.players);
    writer.u8(info.max_players);
    writer.u8(info.bots);
    writer.u8(info.server_type);
    writer.u8(info.environment);
    writer.u8(info.visibility);
    writer.u8(info.vac);
    writer.finish()
}

pub fn encode_challenge_response(challenge: u32) -> Vec<u8> {
    let mut writer = PacketWriter::new(CHALLENGE_RESPONSE_HEADER);
    writer.u32_le(challenge);
    writer.finish()
}

/// The count field is one byte; records past the 255th are not written.
pub fn encode_player_list_response(players: &[PlayerInfo]) -> Vec<u8> {
    let players = &players[..players.len().min(u8::MAX as usize)];

    let mut writer = PacketWriter::new(PLAYER_RESPONSE_HEADER);
    writer.u8(players.len() as u8);
    for player in players {
        writer.u8(player.index);
        writer.cstring(&player.name);
        writer.u32_le(player.score);
        writer.f32_le(player.duration);
    }
    writer.finish()
}
