/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! The price-time-priority limit order book for a single instrument.
//!
//! Bids and asks are kept in separate [`BTreeMap`]s keyed by price, walked
//! from the best price outward during matching; this is an explicit
//! alternative to the sentinel/negated-price technique some order books
//! use, permitted because the book is only ever touched from one thread
//! (see `DESIGN.md`). Orders are lazily removed from a level's queue: a
//! filled or cancelled order stays at the front of its queue until a later
//! match walks past it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::protocol::TOP_LEVEL_COUNT;
use crate::types::{ClientOrderId, Instrument, Lifespan, Price, Side, Volume};

use super::fees::{round_half_to_even, FeeRates};
use super::listener::{OrderListener, TradeListener};
use super::order::{Order, OrderToken};

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("unknown order token")]
pub struct UnknownOrderError;

#[derive(Default)]
struct Level {
    orders: VecDeque<Rc<RefCell<Order>>>,
    total_volume: Volume,
}

/// Top [`TOP_LEVEL_COUNT`] price/volume pairs on each side, best-first,
/// zero-padded when the book is shallower than that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopLevels {
    pub ask_prices: [Price; TOP_LEVEL_COUNT],
    pub ask_volumes: [Volume; TOP_LEVEL_COUNT],
    pub bid_prices: [Price; TOP_LEVEL_COUNT],
    pub bid_volumes: [Volume; TOP_LEVEL_COUNT],
}

impl Default for TopLevels {
    fn default() -> Self {
        Self {
            ask_prices: [0; TOP_LEVEL_COUNT],
            ask_volumes: [0; TOP_LEVEL_COUNT],
            bid_prices: [0; TOP_LEVEL_COUNT],
            bid_volumes: [0; TOP_LEVEL_COUNT],
        }
    }
}

/// Parameters for a new order, handed to [`OrderBook::insert`]. The book
/// assigns the [`OrderToken`] and constructs the resting [`Order`] record.
pub struct NewOrder {
    pub client_order_id: ClientOrderId,
    pub side: Side,
    pub lifespan: Lifespan,
    pub price: Price,
    pub volume: Volume,
    pub listener: Option<Rc<dyn OrderListener>>,
}

pub struct OrderBook {
    instrument: Instrument,
    fee_rates: FeeRates,
    bids: BTreeMap<Price, Level>,
    asks: BTreeMap<Price, Level>,
    index: HashMap<OrderToken, (Price, Side)>,
    next_token: u64,
    last_traded_price: Option<Price>,
    trade_listener: Option<TradeListener>,
}

impl OrderBook {
    pub fn new(instrument: Instrument, fee_rates: FeeRates) -> Self {
        Self {
            instrument,
            fee_rates,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
            next_token: 0,
            last_traded_price: None,
            trade_listener: None,
        }
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    /// Installs the callback fired once per traded price level, after both
    /// sides of that level have received `on_order_filled`.
    pub fn set_trade_listener(&mut self, listener: TradeListener) {
        self.trade_listener = Some(listener);
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    pub fn last_traded_price(&self) -> Option<Price> {
        self.last_traded_price
    }

    /// `None` when either side of the book is empty: there is no
    /// well-defined midpoint to hedge against.
    pub fn midpoint_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(round_half_to_even((bid + ask) as f64 / 2.0)),
            _ => None,
        }
    }

    pub fn top_levels(&self) -> TopLevels {
        let mut top = TopLevels::default();
        for (i, (&price, level)) in self.bids.iter().rev().take(TOP_LEVEL_COUNT).enumerate() {
            top.bid_prices[i] = price;
            top.bid_volumes[i] = level.total_volume;
        }
        for (i, (&price, level)) in self.asks.iter().take(TOP_LEVEL_COUNT).enumerate() {
            top.ask_prices[i] = price;
            top.ask_volumes[i] = level.total_volume;
        }
        top
    }

    fn alloc_token(&mut self) -> OrderToken {
        let token = OrderToken(self.next_token);
        self.next_token += 1;
        token
    }

    /// Matches the new order against the resting book, then either places
    /// any unfilled residual (GFD) or cancels it (FAK). Returns the live
    /// `Order` record so the caller can inspect the immediate fill result
    /// and, for anything left resting, use its `token` for later amend/
    /// cancel calls.
    pub fn insert(&mut self, now: f64, spec: NewOrder) -> Rc<RefCell<Order>> {
        let token = self.alloc_token();
        let mut order = Order::new(
            token,
            spec.client_order_id,
            self.instrument,
            spec.side,
            spec.lifespan,
            spec.price,
            spec.volume,
            spec.listener,
        );

        match order.side {
            Side::Buy => {
                if self.best_ask().map_or(false, |ask| order.price >= ask) {
                    self.match_against_asks(now, &mut order);
                }
            }
            Side::Sell => {
                if self.best_bid().map_or(false, |bid| order.price <= bid) {
                    self.match_against_bids(now, &mut order);
                }
            }
        }

        if order.remaining_volume > 0 {
            if order.lifespan == Lifespan::FillAndKill {
                let removed = order.remaining_volume;
                order.remaining_volume = 0;
                if let Some(listener) = order.listener.clone() {
                    listener.on_order_cancelled(now, &order, removed);
                }
                return Rc::new(RefCell::new(order));
            }
            return self.place(now, order);
        }
        Rc::new(RefCell::new(order))
    }

    /// Rests an order that did not fully fill. A residual left over from a
    /// partial fill is not re-announced as placed: the fill callback the
    /// listener already received is the only notification it gets before
    /// the order settles onto the book.
    fn place(&mut self, now: f64, order: Order) -> Rc<RefCell<Order>> {
        let token = order.token;
        let price = order.price;
        let side = order.side;
        let listener = order.listener.clone();
        let volume = order.remaining_volume;
        let partially_filled = order.fill_volume() > 0;
        let rc = Rc::new(RefCell::new(order));

        self.index.insert(token, (price, side));
        let level_map = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = level_map.entry(price).or_default();
        level.total_volume += volume;
        level.orders.push_back(rc.clone());

        if !partially_filled {
            if let Some(listener) = listener {
                listener.on_order_placed(now, &rc.borrow());
            }
        }
        rc
    }

    /// Reduces a resting order's volume. `new_volume` must not exceed the
    /// order's already-filled volume nor its current requested volume;
    /// enforcing that is the caller's (competitor validation) job.
    pub fn amend(
        &mut self,
        now: f64,
        token: OrderToken,
        new_volume: Volume,
    ) -> Result<(), UnknownOrderError> {
        let (price, side) = *self.index.get(&token).ok_or(UnknownOrderError)?;
        let rc = self.find_in_level(price, side, token)?;

        let (removed_volume, listener) = {
            let mut order = rc.borrow_mut();
            let filled = order.volume - order.remaining_volume;
            // volume can never drop below what has already filled: the
            // floor, not the requested new_volume, is what the order
            // settles at.
            let floor = new_volume.max(filled);
            let removed = order.volume.saturating_sub(floor);
            order.volume = floor;
            order.remaining_volume -= removed;
            (removed, order.listener.clone())
        };

        if removed_volume > 0 {
            self.remove_volume_from_level(price, side, removed_volume);
        }
        if rc.borrow().remaining_volume == 0 {
            self.index.remove(&token);
        }
        if let Some(listener) = listener {
            listener.on_order_amended(now, &rc.borrow(), removed_volume);
        }
        Ok(())
    }

    pub fn cancel(&mut self, now: f64, token: OrderToken) -> Result<(), UnknownOrderError> {
        let (price, side) = *self.index.get(&token).ok_or(UnknownOrderError)?;
        let rc = self.find_in_level(price, side, token)?;

        let (removed_volume, listener) = {
            let mut order = rc.borrow_mut();
            let removed = order.remaining_volume;
            order.remaining_volume = 0;
            (removed, order.listener.clone())
        };

        self.remove_volume_from_level(price, side, removed_volume);
        self.index.remove(&token);
        if let Some(listener) = listener {
            listener.on_order_cancelled(now, &rc.borrow(), removed_volume);
        }
        Ok(())
    }

    fn find_in_level(
        &self,
        price: Price,
        side: Side,
        token: OrderToken,
    ) -> Result<Rc<RefCell<Order>>, UnknownOrderError> {
        let level_map = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        level_map
            .get(&price)
            .and_then(|level| level.orders.iter().find(|o| o.borrow().token == token))
            .cloned()
            .ok_or(UnknownOrderError)
    }

    fn remove_volume_from_level(&mut self, price: Price, side: Side, volume: Volume) {
        let level_map = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if let std::collections::btree_map::Entry::Occupied(mut entry) = level_map.entry(price) {
            let level = entry.get_mut();
            level.total_volume -= volume;
            if level.total_volume == 0 {
                entry.remove();
            }
        }
    }

    fn match_against_bids(&mut self, now: f64, order: &mut Order) {
        while order.remaining_volume > 0 {
            let best_bid = match self.best_bid() {
                Some(p) if p >= order.price => p,
                _ => break,
            };
            self.trade_level(now, order, best_bid, Side::Buy);
            let exhausted = self.bids.get(&best_bid).map_or(true, |l| l.total_volume == 0);
            if exhausted {
                self.bids.remove(&best_bid);
            }
        }
    }

    fn match_against_asks(&mut self, now: f64, order: &mut Order) {
        while order.remaining_volume > 0 {
            let best_ask = match self.best_ask() {
                Some(p) if p <= order.price => p,
                _ => break,
            };
            self.trade_level(now, order, best_ask, Side::Sell);
            let exhausted = self.asks.get(&best_ask).map_or(true, |l| l.total_volume == 0);
            if exhausted {
                self.asks.remove(&best_ask);
            }
        }
    }

    /// Walks one resting price level, filling the aggressor `order`
    /// against queued passive orders front-to-back, lazily skipping any
    /// already-exhausted order at the front of the queue.
    fn trade_level(&mut self, now: f64, order: &mut Order, level_price: Price, passive_side: Side) {
        let level_map = match passive_side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = level_map
            .get_mut(&level_price)
            .expect("level exists for a just-matched price");

        let mut remaining_in_order = order.remaining_volume;
        let mut level_total = level.total_volume;
        let mut done_tokens = Vec::new();

        while remaining_in_order > 0 && level_total > 0 {
            while level
                .orders
                .front()
                .map_or(false, |o| o.borrow().remaining_volume == 0)
            {
                level.orders.pop_front();
            }
            let passive_rc = level
                .orders
                .front()
                .expect("total_volume > 0 implies a live order at the front")
                .clone();
            let volume;
            let fee;
            let passive_done;
            let passive_listener;
            {
                let mut passive = passive_rc.borrow_mut();
                volume = remaining_in_order.min(passive.remaining_volume);
                fee = self.fee_rates.maker_fee(level_price, volume);
                passive.remaining_volume -= volume;
                passive.total_fees += fee;
                passive_done = passive.remaining_volume == 0;
                passive_listener = passive.listener.clone();
            }
            level_total -= volume;
            remaining_in_order -= volume;
            if let Some(listener) = passive_listener {
                listener.on_order_filled(now, &passive_rc.borrow(), level_price, volume, fee);
            }
            if passive_done {
                done_tokens.push(passive_rc.borrow().token);
            }
        }
        level.total_volume = level_total;
        for token in done_tokens {
            self.index.remove(&token);
        }

        let traded_volume = order.remaining_volume - remaining_in_order;
        if traded_volume == 0 {
            return;
        }
        let fee = self.fee_rates.taker_fee(level_price, traded_volume);
        order.remaining_volume = remaining_in_order;
        order.total_fees += fee;
        if let Some(listener) = order.listener.clone() {
            listener.on_order_filled(now, order, level_price, traded_volume, fee);
        }
        self.last_traded_price = Some(level_price);
        if let Some(trade_listener) = &self.trade_listener {
            trade_listener(level_price, traded_volume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fee, Instrument};

    fn book() -> OrderBook {
        OrderBook::new(Instrument::Future, FeeRates::new(-0.0001, 0.0002))
    }

    fn order(side: Side, price: Price, volume: Volume, lifespan: Lifespan) -> NewOrder {
        NewOrder {
            client_order_id: 1,
            side,
            lifespan,
            price,
            volume,
            listener: None,
        }
    }

    #[test]
    fn resting_order_appears_in_top_levels() {
        let mut b = book();
        b.insert(0.0, order(Side::Buy, 100, 10, Lifespan::GoodForDay));
        let top = b.top_levels();
        assert_eq!(top.bid_prices[0], 100);
        assert_eq!(top.bid_volumes[0], 10);
        assert_eq!(b.best_bid(), Some(100));
    }

    #[test]
    fn crossing_order_trades_immediately() {
        let mut b = book();
        b.insert(0.0, order(Side::Sell, 100, 10, Lifespan::GoodForDay));
        let aggressor = b.insert(0.0, order(Side::Buy, 100, 4, Lifespan::GoodForDay));
        assert_eq!(aggressor.borrow().remaining_volume, 0);
        assert_eq!(b.best_ask(), Some(100));
        assert_eq!(b.top_levels().ask_volumes[0], 6);
        assert_eq!(b.last_traded_price(), Some(100));
    }

    #[test]
    fn fill_and_kill_residual_is_cancelled_not_placed() {
        let mut b = book();
        b.insert(0.0, order(Side::Sell, 100, 3, Lifespan::GoodForDay));
        let aggressor = b.insert(0.0, order(Side::Buy, 100, 10, Lifespan::FillAndKill));
        assert_eq!(aggressor.borrow().remaining_volume, 0);
        assert_eq!(aggressor.borrow().fill_volume(), 3);
        assert!(b.best_bid().is_none());
    }

    #[test]
    fn amend_below_resting_volume_shrinks_level() {
        let mut b = book();
        let resting = b.insert(0.0, order(Side::Buy, 100, 10, Lifespan::GoodForDay));
        let token = resting.borrow().token;
        b.amend(0.0, token, 4).unwrap();
        assert_eq!(b.top_levels().bid_volumes[0], 4);
    }

    #[test]
    fn amend_below_fill_volume_is_floored_at_what_already_filled() {
        let mut b = book();
        let resting = b.insert(0.0, order(Side::Buy, 10_000, 10, Lifespan::GoodForDay));
        let token = resting.borrow().token;
        b.insert(0.0, order(Side::Sell, 10_000, 4, Lifespan::GoodForDay));
        assert_eq!(resting.borrow().fill_volume(), 4);

        b.amend(0.0, token, 2).unwrap();
        assert_eq!(resting.borrow().volume, 4);
        assert_eq!(resting.borrow().remaining_volume, 0);
        assert!(b.best_bid().is_none());
    }

    #[test]
    fn cancel_removes_level_when_last_order_leaves() {
        let mut b = book();
        let resting = b.insert(0.0, order(Side::Buy, 100, 10, Lifespan::GoodForDay));
        let token = resting.borrow().token;
        b.cancel(0.0, token).unwrap();
        assert!(b.best_bid().is_none());
    }

    #[test]
    fn partial_fill_residual_is_not_re_announced_as_placed() {
        use super::super::listener::OrderListener;
        use std::cell::Cell;

        struct Spy {
            placed: Cell<u32>,
            filled: Cell<u32>,
        }
        impl OrderListener for Spy {
            fn on_order_placed(&self, _now: f64, _order: &Order) {
                self.placed.set(self.placed.get() + 1);
            }
            fn on_order_filled(&self, _now: f64, _order: &Order, _price: Price, _volume: Volume, _fee: Fee) {
                self.filled.set(self.filled.get() + 1);
            }
        }

        let mut b = book();
        b.insert(0.0, order(Side::Buy, 9900, 5, Lifespan::GoodForDay));

        let spy = Rc::new(Spy { placed: Cell::new(0), filled: Cell::new(0) });
        let resting = b.insert(
            0.0,
            NewOrder {
                client_order_id: 2,
                side: Side::Sell,
                lifespan: Lifespan::GoodForDay,
                price: 9900,
                volume: 8,
                listener: Some(spy.clone()),
            },
        );
        assert_eq!(resting.borrow().remaining_volume, 3);
        assert_eq!(spy.filled.get(), 1);
        assert_eq!(spy.placed.get(), 0, "a partial-fill residual must not receive a placed callback");
    }

    #[test]
    fn midpoint_is_none_when_one_sided() {
        let mut b = book();
        b.insert(0.0, order(Side::Buy, 100, 10, Lifespan::GoodForDay));
        assert_eq!(b.midpoint_price(), None);
        b.insert(0.0, order(Side::Sell, 104, 10, Lifespan::GoodForDay));
        assert_eq!(b.midpoint_price(), Some(102));
    }
}
