/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Callback seams an [`OrderBook`](super::book::OrderBook) uses to notify
//! whoever owns an order, without the book needing to know what kind of
//! thing that is (a competitor, or the market-event pump's house account).
//!
//! The engine is single-threaded and cooperative, so these are plain `Rc`
//! trait objects rather than `Arc<dyn Fn + Send + Sync>` — there is never a
//! second thread that could race a listener callback.

use crate::types::{Fee, Price, Volume};
use std::rc::Rc;

use super::order::Order;

/// The capability set an order's owner implements. Every method has a
/// no-op default so implementors only override what they care about (the
/// market-event pump's house orders, for instance, ignore fills).
pub trait OrderListener {
    fn on_order_placed(&self, _now: f64, _order: &Order) {}
    fn on_order_amended(&self, _now: f64, _order: &Order, _volume_removed: Volume) {}
    fn on_order_cancelled(&self, _now: f64, _order: &Order, _volume_removed: Volume) {}
    fn on_order_filled(&self, _now: f64, _order: &Order, _price: Price, _volume: Volume, _fee: Fee) {
    }
}

/// Fired once per matched price level, after both sides of that level have
/// been notified via [`OrderListener::on_order_filled`].
pub type TradeListener = Rc<dyn Fn(Price, Volume)>;
