/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Error tiers for the matching engine.
//!
//! The engine distinguishes three severities (see [`Severity`]): a soft
//! per-request rejection that only affects the offending order, a hard
//! breach that also terminates the competitor's channel, and a fatal error
//! that terminates the whole match. [`OrderRejection`] and [`HardBreach`]
//! carry the exact wording a competitor sees in an `ERROR` message.

use std::fmt;
use thiserror::Error;

/// Why a single order/amend/cancel request was rejected. The offending
/// competitor receives an `ERROR` message; their channel stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum OrderRejection {
    #[error("out-of-order client_order_id in amend message")]
    OutOfOrderAmendId,
    #[error("amend operation would increase order volume")]
    AmendWouldIncreaseVolume,
    #[error("out-of-order client_order_id in cancel message")]
    OutOfOrderCancelId,
    #[error("duplicate or out-of-order client_order_id")]
    DuplicateOrOutOfOrderInsertId,
    #[error("{0} is not a valid side")]
    InvalidSide(u8),
    #[error("{0} is not a valid lifespan")]
    InvalidLifespan(u8),
    #[error("price is not a multiple of tick size")]
    InvalidTickSize,
    #[error("order rejected: active order count limit breached")]
    ActiveOrderCountLimitBreached,
    #[error("order rejected: invalid volume")]
    InvalidVolume,
    #[error("order rejected: active order volume limit breached")]
    ActiveVolumeLimitBreached,
    #[error("order rejected: market not yet open")]
    MarketNotYetOpen,
    #[error("order rejected: in cross with an existing order")]
    SelfCross,
    #[error("unknown order")]
    UnknownOrder,
}

/// A breach that terminates the competitor's channel, but not the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum HardBreach {
    #[error("position limit breached")]
    PositionLimit,
    #[error("message frequency limit breached")]
    MessageFrequency,
}

/// A condition that terminates the entire match; the engine cannot make
/// forward progress.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FatalError {
    #[error("market event stream exhausted before controller shutdown")]
    MarketEventStreamDesync,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("wire protocol violation: {0}")]
    Protocol(#[from] crate::protocol::ProtocolError),
}

/// Severity classification shared by all three error families, used by
/// callers that need to decide whether to keep a channel open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Only the offending request is rejected.
    Soft,
    /// The competitor's channel is closed; the match continues.
    Breach,
    /// The whole match terminates.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Soft => write!(f, "soft"),
            Severity::Breach => write!(f, "breach"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}
