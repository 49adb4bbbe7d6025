/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Convenience re-exports of the types most callers need.

pub use crate::account::{Account, AccountConfig};
pub use crate::book::{FeeRates, NewOrder, Order, OrderBook, OrderListener, OrderToken, TopLevels, UnknownOrderError};
pub use crate::competitor::{Competitor, ExecutionChannel, Limits};
pub use crate::config::MatchConfig;
pub use crate::controller::{Controller, DisseminationFrame, TickOutcome};
pub use crate::error::{FatalError, HardBreach, OrderRejection, Severity};
pub use crate::limiter::FrequencyLimiter;
pub use crate::market_events::{MarketEvent, MarketEventOperation, MarketEventSource, MarketEventsPump};
pub use crate::match_events::{AccountSnapshot, ChannelMatchEventSink, MatchEventRecord, MatchEventSink, MatchOperation};
pub use crate::protocol::{
    AmendMessage, CancelMessage, ErrorMessage, InsertMessage, LoginMessage, MessageType,
    OrderBookUpdateMessage, OrderStatusMessage, PositionChangeMessage, ProtocolError, TradeTicksMessage,
};
pub use crate::types::{ClientOrderId, Fee, Instrument, Lifespan, Price, Side, Volume};
