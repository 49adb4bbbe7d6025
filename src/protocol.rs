/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Wire framing for the execution and information channels.
//!
//! Every message is a 3-byte big-endian header (`u16` total length, `u8`
//! message type) followed by a fixed-size payload. This module only does
//! byte-level encode/decode: no socket is opened here, that is an external
//! collaborator's job (see `SPEC_FULL.md` §0).

use thiserror::Error;

/// Size of the `(length, type)` header in bytes.
pub const HEADER_SIZE: usize = 3;
/// Number of price levels carried in an order book update.
pub const TOP_LEVEL_COUNT: usize = 5;
/// Maximum UDP payload the information channel will emit.
pub const MAX_DATAGRAM_SIZE: usize = 508;
/// Size of one `(price, volume)` trade tick entry.
pub const TRADE_TICK_SIZE: usize = 8;
/// Header size of a `TRADE_TICKS` message (3-byte frame header + 1-byte
/// instrument field).
pub const TRADE_TICKS_HEADER_SIZE: usize = HEADER_SIZE + 1;
/// How many trade ticks fit in a single datagram alongside the header.
pub const MAX_TRADE_TICKS: usize = (MAX_DATAGRAM_SIZE - TRADE_TICKS_HEADER_SIZE) / TRADE_TICK_SIZE;

const LOGIN_NAME_SIZE: usize = 20;
const LOGIN_SECRET_SIZE: usize = 50;
const ERROR_TEXT_SIZE: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("frame too short: need at least {need} bytes, have {have}")]
    FrameTooShort { need: usize, have: usize },
    #[error("header declares length {declared} but frame is {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("expected message type {expected:?}, found {found:?}")]
    UnexpectedMessageType {
        expected: MessageType,
        found: MessageType,
    },
    #[error("field '{field}' is {len} bytes, exceeds the {max}-byte wire slot")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// The nine message types carried by the execution and information
/// channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Amend = 1,
    Cancel = 2,
    Error = 3,
    Insert = 4,
    Login = 5,
    OrderBookUpdate = 6,
    OrderStatus = 7,
    PositionChange = 8,
    TradeTicks = 10,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Amend),
            2 => Ok(MessageType::Cancel),
            3 => Ok(MessageType::Error),
            4 => Ok(MessageType::Insert),
            5 => Ok(MessageType::Login),
            6 => Ok(MessageType::OrderBookUpdate),
            7 => Ok(MessageType::OrderStatus),
            8 => Ok(MessageType::PositionChange),
            10 => Ok(MessageType::TradeTicks),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

fn write_header(buf: &mut Vec<u8>, message_type: MessageType, payload_len: usize) {
    let total = (HEADER_SIZE + payload_len) as u16;
    buf.extend_from_slice(&total.to_be_bytes());
    buf.push(message_type as u8);
}

/// Splits a frame into `(declared_total_len, message_type, payload)`,
/// validating that the declared length matches the actual frame size.
fn read_header(frame: &[u8]) -> Result<(MessageType, &[u8]), ProtocolError> {
    if frame.len() < HEADER_SIZE {
        return Err(ProtocolError::FrameTooShort {
            need: HEADER_SIZE,
            have: frame.len(),
        });
    }
    let declared = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    if declared != frame.len() {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }
    let message_type = MessageType::try_from(frame[2])?;
    Ok((message_type, &frame[HEADER_SIZE..]))
}

fn fixed_bytes<const N: usize>(
    field: &'static str,
    value: &str,
) -> Result<[u8; N], ProtocolError> {
    let bytes = value.as_bytes();
    if bytes.len() > N {
        return Err(ProtocolError::FieldTooLong {
            field,
            len: bytes.len(),
            max: N,
        });
    }
    let mut out = [0u8; N];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

fn trim_nul_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// `client_order_id`, `volume` — request to reduce a resting order's volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmendMessage {
    pub client_order_id: u32,
    pub volume: u32,
}

impl AmendMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + 8);
        write_header(&mut buf, MessageType::Amend, 8);
        buf.extend_from_slice(&self.client_order_id.to_be_bytes());
        buf.extend_from_slice(&self.volume.to_be_bytes());
        buf
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, payload) = read_header(frame)?;
        expect_type(kind, MessageType::Amend)?;
        expect_len(payload, 8)?;
        Ok(Self {
            client_order_id: u32::from_be_bytes(payload[0..4].try_into().unwrap()),
            volume: u32::from_be_bytes(payload[4..8].try_into().unwrap()),
        })
    }
}

/// `client_order_id` — request to cancel a resting order outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelMessage {
    pub client_order_id: u32,
}

impl CancelMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + 4);
        write_header(&mut buf, MessageType::Cancel, 4);
        buf.extend_from_slice(&self.client_order_id.to_be_bytes());
        buf
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, payload) = read_header(frame)?;
        expect_type(kind, MessageType::Cancel)?;
        expect_len(payload, 4)?;
        Ok(Self {
            client_order_id: u32::from_be_bytes(payload[0..4].try_into().unwrap()),
        })
    }
}

/// Raw wire fields for a new order. `side` and `lifespan` are passed
/// through unvalidated: rejecting an out-of-range value is the
/// competitor validation pipeline's job, not the wire layer's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertMessage {
    pub client_order_id: u32,
    pub side: u8,
    pub price: u32,
    pub volume: u32,
    pub lifespan: u8,
}

impl InsertMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + 14);
        write_header(&mut buf, MessageType::Insert, 14);
        buf.extend_from_slice(&self.client_order_id.to_be_bytes());
        buf.push(self.side);
        buf.extend_from_slice(&self.price.to_be_bytes());
        buf.extend_from_slice(&self.volume.to_be_bytes());
        buf.push(self.lifespan);
        buf
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, payload) = read_header(frame)?;
        expect_type(kind, MessageType::Insert)?;
        expect_len(payload, 14)?;
        Ok(Self {
            client_order_id: u32::from_be_bytes(payload[0..4].try_into().unwrap()),
            side: payload[4],
            price: u32::from_be_bytes(payload[5..9].try_into().unwrap()),
            volume: u32::from_be_bytes(payload[9..13].try_into().unwrap()),
            lifespan: payload[13],
        })
    }
}

/// `name`, `secret` — fixed-width, NUL-padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginMessage {
    pub name: String,
    pub secret: String,
}

impl LoginMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let name: [u8; LOGIN_NAME_SIZE] = fixed_bytes("name", &self.name)?;
        let secret: [u8; LOGIN_SECRET_SIZE] = fixed_bytes("secret", &self.secret)?;
        let mut buf = Vec::with_capacity(HEADER_SIZE + LOGIN_NAME_SIZE + LOGIN_SECRET_SIZE);
        write_header(&mut buf, MessageType::Login, LOGIN_NAME_SIZE + LOGIN_SECRET_SIZE);
        buf.extend_from_slice(&name);
        buf.extend_from_slice(&secret);
        Ok(buf)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, payload) = read_header(frame)?;
        expect_type(kind, MessageType::Login)?;
        expect_len(payload, LOGIN_NAME_SIZE + LOGIN_SECRET_SIZE)?;
        Ok(Self {
            name: trim_nul_str(&payload[0..LOGIN_NAME_SIZE]),
            secret: trim_nul_str(&payload[LOGIN_NAME_SIZE..LOGIN_NAME_SIZE + LOGIN_SECRET_SIZE]),
        })
    }
}

/// `client_order_id`, `error_message` — sent for every soft rejection and
/// as a prelude to closing a channel on a hard breach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub client_order_id: u32,
    pub error_message: String,
}

impl ErrorMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let text: [u8; ERROR_TEXT_SIZE] = fixed_bytes("error_message", &self.error_message)?;
        let mut buf = Vec::with_capacity(HEADER_SIZE + 4 + ERROR_TEXT_SIZE);
        write_header(&mut buf, MessageType::Error, 4 + ERROR_TEXT_SIZE);
        buf.extend_from_slice(&self.client_order_id.to_be_bytes());
        buf.extend_from_slice(&text);
        Ok(buf)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, payload) = read_header(frame)?;
        expect_type(kind, MessageType::Error)?;
        expect_len(payload, 4 + ERROR_TEXT_SIZE)?;
        Ok(Self {
            client_order_id: u32::from_be_bytes(payload[0..4].try_into().unwrap()),
            error_message: trim_nul_str(&payload[4..4 + ERROR_TEXT_SIZE]),
        })
    }
}

/// Top-of-book snapshot: up to [`TOP_LEVEL_COUNT`] price/volume pairs per
/// side, zero-padded when the book is shallower than that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBookUpdateMessage {
    pub instrument: u8,
    pub sequence_number: u32,
    pub ask_prices: [u32; TOP_LEVEL_COUNT],
    pub ask_volumes: [u32; TOP_LEVEL_COUNT],
    pub bid_prices: [u32; TOP_LEVEL_COUNT],
    pub bid_volumes: [u32; TOP_LEVEL_COUNT],
}

const ORDER_BOOK_PAYLOAD_LEN: usize = 1 + 4 + TOP_LEVEL_COUNT * 4 * 4;

impl OrderBookUpdateMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + ORDER_BOOK_PAYLOAD_LEN);
        write_header(&mut buf, MessageType::OrderBookUpdate, ORDER_BOOK_PAYLOAD_LEN);
        buf.push(self.instrument);
        buf.extend_from_slice(&self.sequence_number.to_be_bytes());
        for arr in [
            &self.ask_prices,
            &self.ask_volumes,
            &self.bid_prices,
            &self.bid_volumes,
        ] {
            for v in arr {
                buf.extend_from_slice(&v.to_be_bytes());
            }
        }
        buf
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, payload) = read_header(frame)?;
        expect_type(kind, MessageType::OrderBookUpdate)?;
        expect_len(payload, ORDER_BOOK_PAYLOAD_LEN)?;
        let instrument = payload[0];
        let sequence_number = u32::from_be_bytes(payload[1..5].try_into().unwrap());
        let mut cursor = 5;
        let mut read_group = || {
            let mut out = [0u32; TOP_LEVEL_COUNT];
            for slot in out.iter_mut() {
                *slot = u32::from_be_bytes(payload[cursor..cursor + 4].try_into().unwrap());
                cursor += 4;
            }
            out
        };
        let ask_prices = read_group();
        let ask_volumes = read_group();
        let bid_prices = read_group();
        let bid_volumes = read_group();
        Ok(Self {
            instrument,
            sequence_number,
            ask_prices,
            ask_volumes,
            bid_prices,
            bid_volumes,
        })
    }
}

/// `client_order_id`, `fill_volume`, `remaining_volume`, `fees`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderStatusMessage {
    pub client_order_id: u32,
    pub fill_volume: u32,
    pub remaining_volume: u32,
    pub fees: i32,
}

impl OrderStatusMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + 16);
        write_header(&mut buf, MessageType::OrderStatus, 16);
        buf.extend_from_slice(&self.client_order_id.to_be_bytes());
        buf.extend_from_slice(&self.fill_volume.to_be_bytes());
        buf.extend_from_slice(&self.remaining_volume.to_be_bytes());
        buf.extend_from_slice(&self.fees.to_be_bytes());
        buf
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, payload) = read_header(frame)?;
        expect_type(kind, MessageType::OrderStatus)?;
        expect_len(payload, 16)?;
        Ok(Self {
            client_order_id: u32::from_be_bytes(payload[0..4].try_into().unwrap()),
            fill_volume: u32::from_be_bytes(payload[4..8].try_into().unwrap()),
            remaining_volume: u32::from_be_bytes(payload[8..12].try_into().unwrap()),
            fees: i32::from_be_bytes(payload[12..16].try_into().unwrap()),
        })
    }
}

/// `future_position`, `etf_position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionChangeMessage {
    pub future_position: i32,
    pub etf_position: i32,
}

impl PositionChangeMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + 8);
        write_header(&mut buf, MessageType::PositionChange, 8);
        buf.extend_from_slice(&self.future_position.to_be_bytes());
        buf.extend_from_slice(&self.etf_position.to_be_bytes());
        buf
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, payload) = read_header(frame)?;
        expect_type(kind, MessageType::PositionChange)?;
        expect_len(payload, 8)?;
        Ok(Self {
            future_position: i32::from_be_bytes(payload[0..4].try_into().unwrap()),
            etf_position: i32::from_be_bytes(payload[4..8].try_into().unwrap()),
        })
    }
}

/// `instrument` plus a run of `(price, volume)` ticks. [`Self::encode`]
/// silently truncates to [`MAX_TRADE_TICKS`] entries, matching the
/// information channel's datagram budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeTicksMessage {
    pub instrument: u8,
    pub ticks: Vec<(u32, u32)>,
}

impl TradeTicksMessage {
    pub fn encode(&self) -> Vec<u8> {
        let ticks = if self.ticks.len() > MAX_TRADE_TICKS {
            &self.ticks[..MAX_TRADE_TICKS]
        } else {
            &self.ticks[..]
        };
        let payload_len = 1 + ticks.len() * TRADE_TICK_SIZE;
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload_len);
        write_header(&mut buf, MessageType::TradeTicks, payload_len);
        buf.push(self.instrument);
        for (price, volume) in ticks {
            buf.extend_from_slice(&price.to_be_bytes());
            buf.extend_from_slice(&volume.to_be_bytes());
        }
        buf
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let (kind, payload) = read_header(frame)?;
        expect_type(kind, MessageType::TradeTicks)?;
        if payload.is_empty() {
            return Err(ProtocolError::FrameTooShort {
                need: 1,
                have: 0,
            });
        }
        let instrument = payload[0];
        let rest = &payload[1..];
        if rest.len() % TRADE_TICK_SIZE != 0 {
            return Err(ProtocolError::LengthMismatch {
                declared: rest.len(),
                actual: rest.len() - (rest.len() % TRADE_TICK_SIZE),
            });
        }
        let ticks = rest
            .chunks_exact(TRADE_TICK_SIZE)
            .map(|c| {
                (
                    u32::from_be_bytes(c[0..4].try_into().unwrap()),
                    u32::from_be_bytes(c[4..8].try_into().unwrap()),
                )
            })
            .collect();
        Ok(Self { instrument, ticks })
    }
}

fn expect_type(found: MessageType, expected: MessageType) -> Result<(), ProtocolError> {
    if found as u8 == expected as u8 {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedMessageType { expected, found })
    }
}

fn expect_len(payload: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if payload.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::LengthMismatch {
            declared: payload.len(),
            actual: expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amend_round_trips() {
        let msg = AmendMessage {
            client_order_id: 7,
            volume: 42,
        };
        let frame = msg.encode();
        assert_eq!(frame.len(), HEADER_SIZE + 8);
        assert_eq!(AmendMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn insert_round_trips() {
        let msg = InsertMessage {
            client_order_id: 1,
            side: 1,
            price: 10_000,
            volume: 5,
            lifespan: 0,
        };
        let frame = msg.encode();
        assert_eq!(InsertMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn login_pads_and_trims() {
        let msg = LoginMessage {
            name: "trader1".into(),
            secret: "hunter2".into(),
        };
        let frame = msg.encode().unwrap();
        assert_eq!(frame.len(), HEADER_SIZE + LOGIN_NAME_SIZE + LOGIN_SECRET_SIZE);
        assert_eq!(LoginMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn login_rejects_oversized_fields() {
        let msg = LoginMessage {
            name: "a".repeat(LOGIN_NAME_SIZE + 1),
            secret: "s".into(),
        };
        assert!(matches!(
            msg.encode(),
            Err(ProtocolError::FieldTooLong { field: "name", .. })
        ));
    }

    #[test]
    fn order_book_update_round_trips() {
        let msg = OrderBookUpdateMessage {
            instrument: 1,
            sequence_number: 99,
            ask_prices: [101, 102, 0, 0, 0],
            ask_volumes: [3, 4, 0, 0, 0],
            bid_prices: [99, 98, 0, 0, 0],
            bid_volumes: [1, 2, 0, 0, 0],
        };
        let frame = msg.encode();
        assert_eq!(OrderBookUpdateMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn trade_ticks_truncate_to_datagram_budget() {
        let ticks: Vec<(u32, u32)> = (0..(MAX_TRADE_TICKS + 10))
            .map(|i| (i as u32, i as u32))
            .collect();
        let msg = TradeTicksMessage {
            instrument: 0,
            ticks,
        };
        let frame = msg.encode();
        assert!(frame.len() <= MAX_DATAGRAM_SIZE);
        let decoded = TradeTicksMessage::decode(&frame).unwrap();
        assert_eq!(decoded.ticks.len(), MAX_TRADE_TICKS);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut frame = CancelMessage { client_order_id: 1 }.encode();
        frame.push(0xff);
        assert!(matches!(
            CancelMessage::decode(&frame),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }
}
