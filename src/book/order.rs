/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! The resting order record.

use std::fmt;
use std::rc::Rc;

use crate::types::{ClientOrderId, Fee, Instrument, Lifespan, Price, Side, Volume};

use super::listener::OrderListener;

/// An engine-assigned handle, unique across both books for the lifetime of
/// the match. Distinct from [`ClientOrderId`], which is only unique within
/// a single competitor's own order stream (or within the market-event
/// file's own id space for house orders).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderToken(pub(crate) u64);

/// A single order, live or filled/cancelled. Kept in the book's level
/// queues until lazily popped during matching (see `OrderBook::trade_level`),
/// even after its `remaining_volume` reaches zero.
pub struct Order {
    pub token: OrderToken,
    pub client_order_id: ClientOrderId,
    pub instrument: Instrument,
    pub side: Side,
    pub lifespan: Lifespan,
    pub price: Price,
    /// Requested volume net of amendments (never net of fills).
    pub volume: Volume,
    pub remaining_volume: Volume,
    pub total_fees: Fee,
    pub(crate) listener: Option<Rc<dyn OrderListener>>,
}

impl Order {
    pub fn new(
        token: OrderToken,
        client_order_id: ClientOrderId,
        instrument: Instrument,
        side: Side,
        lifespan: Lifespan,
        price: Price,
        volume: Volume,
        listener: Option<Rc<dyn OrderListener>>,
    ) -> Self {
        Self {
            token,
            client_order_id,
            instrument,
            side,
            lifespan,
            price,
            volume,
            remaining_volume: volume,
            total_fees: 0,
            listener,
        }
    }

    pub fn fill_volume(&self) -> Volume {
        self.volume - self.remaining_volume
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_volume == 0
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order(id={}, {} {:?} {} @ {} remaining={}/{} fees={})",
            self.client_order_id,
            self.instrument,
            self.side,
            self.lifespan,
            self.price,
            self.remaining_volume,
            self.volume,
            self.total_fees
        )
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Order")
            .field("token", &self.token)
            .field("client_order_id", &self.client_order_id)
            .field("instrument", &self.instrument)
            .field("side", &self.side)
            .field("lifespan", &self.lifespan)
            .field("price", &self.price)
            .field("volume", &self.volume)
            .field("remaining_volume", &self.remaining_volume)
            .field("total_fees", &self.total_fees)
            .finish()
    }
}
