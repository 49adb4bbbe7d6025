/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Shared scalar types used across the matching engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer cents. All prices are multiples of a configured tick size.
pub type Price = i64;

/// Non-negative order/trade size.
pub type Volume = u64;

/// Fee amount in the same unit as price (cents). Maker fees may be negative
/// (rebates), so this is signed.
pub type Fee = i64;

/// A client-assigned order id, unique and strictly increasing per competitor.
/// Not globally unique: two different competitors may reuse the same value.
pub type ClientOrderId = u32;

/// One of the two traded instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instrument {
    Future,
    Etf,
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Future => write!(f, "FUTURE"),
            Instrument::Etf => write!(f, "ETF"),
        }
    }
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The other side.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "B"),
            Side::Sell => write!(f, "A"),
        }
    }
}

/// Order time-in-force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifespan {
    /// Trades immediately if possible; any unfilled residual is cancelled.
    FillAndKill,
    /// Rests in the book until it trades or is explicitly cancelled.
    GoodForDay,
}

impl fmt::Display for Lifespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifespan::FillAndKill => write!(f, "FAK"),
            Lifespan::GoodForDay => write!(f, "GFD"),
        }
    }
}
