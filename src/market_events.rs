/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Replays scripted market data into both books as the match clock
//! advances. No CSV reader lives here; events arrive through
//! [`MarketEventSource`], an external collaborator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::book::{NewOrder, Order, OrderBook};
use crate::types::{Instrument, Lifespan, Price, Side, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketEventOperation {
    Amend,
    Cancel,
    Insert,
}

/// One row of scripted market data. `volume` is the starting volume for
/// an `Insert`, and a *signed delta* to add to the order's current
/// volume for an `Amend` (negative, since amends in this market only ever
/// shrink); unused for `Cancel`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketEvent {
    pub time: f64,
    pub instrument: Instrument,
    pub operation: MarketEventOperation,
    pub order_id: u32,
    pub side: Side,
    pub volume: i64,
    pub price: Price,
    pub lifespan: Lifespan,
}

/// Supplies the next scripted event in time order. The out-of-scope CSV
/// reader is one implementation of this; tests use a `VecDeque`-backed
/// one.
pub trait MarketEventSource {
    fn next_event(&mut self) -> Option<MarketEvent>;
}

/// Drives scripted orders into the two books as house liquidity, tracking
/// the house's own resting orders by the market-data file's order id so
/// later `Amend`/`Cancel` rows can find them. House orders never carry a
/// listener: nothing needs to observe their fills beyond what already
/// happens to the competitor order on the other side of the trade.
pub struct MarketEventsPump {
    future_book: Rc<RefCell<OrderBook>>,
    etf_book: Rc<RefCell<OrderBook>>,
    future_orders: HashMap<u32, Rc<RefCell<Order>>>,
    etf_orders: HashMap<u32, Rc<RefCell<Order>>>,
    source: Box<dyn MarketEventSource>,
    peeked: Option<MarketEvent>,
    complete: bool,
}

impl MarketEventsPump {
    pub fn new(
        future_book: Rc<RefCell<OrderBook>>,
        etf_book: Rc<RefCell<OrderBook>>,
        source: Box<dyn MarketEventSource>,
    ) -> Self {
        Self {
            future_book,
            etf_book,
            future_orders: HashMap::new(),
            etf_orders: HashMap::new(),
            source,
            peeked: None,
            complete: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Applies every queued event timestamped strictly before
    /// `elapsed_time`. Returns `true` the moment the underlying source is
    /// exhausted, so the caller can begin its shutdown sequence.
    pub fn process_market_events(&mut self, elapsed_time: f64) -> bool {
        loop {
            let evt = match self.peeked.take().or_else(|| self.source.next_event()) {
                Some(evt) => evt,
                None => {
                    self.complete = true;
                    return true;
                }
            };
            if evt.time >= elapsed_time {
                self.peeked = Some(evt);
                return false;
            }
            self.apply(evt);
        }
    }

    fn apply(&mut self, evt: MarketEvent) {
        match evt.operation {
            MarketEventOperation::Insert => self.apply_insert(evt),
            MarketEventOperation::Amend => self.apply_amend(evt),
            MarketEventOperation::Cancel => self.apply_cancel(evt),
        }
    }

    fn apply_insert(&mut self, evt: MarketEvent) {
        let (book, orders): (&Rc<RefCell<OrderBook>>, &mut HashMap<u32, Rc<RefCell<Order>>>) = match evt.instrument {
            Instrument::Future => (&self.future_book, &mut self.future_orders),
            Instrument::Etf => (&self.etf_book, &mut self.etf_orders),
        };
        let order_rc = book.borrow_mut().insert(
            evt.time,
            NewOrder {
                client_order_id: evt.order_id,
                side: evt.side,
                lifespan: evt.lifespan,
                price: evt.price,
                volume: evt.volume.max(0) as Volume,
                listener: None,
            },
        );
        if order_rc.borrow().remaining_volume > 0 {
            orders.insert(evt.order_id, order_rc);
        }
    }

    fn apply_amend(&mut self, evt: MarketEvent) {
        let (book, orders): (&Rc<RefCell<OrderBook>>, &mut HashMap<u32, Rc<RefCell<Order>>>) = match evt.instrument {
            Instrument::Future => (&self.future_book, &mut self.future_orders),
            Instrument::Etf => (&self.etf_book, &mut self.etf_orders),
        };
        let Some(order_rc) = orders.get(&evt.order_id).cloned() else {
            return;
        };
        let token = order_rc.borrow().token;
        let current_volume = order_rc.borrow().volume as i64;
        let new_volume = (current_volume + evt.volume).max(0) as Volume;
        let _ = book.borrow_mut().amend(evt.time, token, new_volume);
        if order_rc.borrow().remaining_volume == 0 {
            orders.remove(&evt.order_id);
        }
    }

    fn apply_cancel(&mut self, evt: MarketEvent) {
        let (book, orders): (&Rc<RefCell<OrderBook>>, &mut HashMap<u32, Rc<RefCell<Order>>>) = match evt.instrument {
            Instrument::Future => (&self.future_book, &mut self.future_orders),
            Instrument::Etf => (&self.etf_book, &mut self.etf_orders),
        };
        if let Some(order_rc) = orders.remove(&evt.order_id) {
            let token = order_rc.borrow().token;
            let _ = book.borrow_mut().cancel(evt.time, token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::FeeRates;
    use std::collections::VecDeque;

    struct QueueSource(VecDeque<MarketEvent>);
    impl MarketEventSource for QueueSource {
        fn next_event(&mut self) -> Option<MarketEvent> {
            self.0.pop_front()
        }
    }

    fn insert_event(time: f64, order_id: u32, side: Side, price: Price, volume: i64) -> MarketEvent {
        MarketEvent {
            time,
            instrument: Instrument::Future,
            operation: MarketEventOperation::Insert,
            order_id,
            side,
            volume,
            price,
            lifespan: Lifespan::GoodForDay,
        }
    }

    #[test]
    fn inserts_house_liquidity_before_the_elapsed_cutoff() {
        let future = Rc::new(RefCell::new(OrderBook::new(Instrument::Future, FeeRates::new(-0.0001, 0.0002))));
        let etf = Rc::new(RefCell::new(OrderBook::new(Instrument::Etf, FeeRates::new(-0.0001, 0.0002))));
        let source = Box::new(QueueSource(VecDeque::from([insert_event(0.5, 1, Side::Buy, 100, 10)])));
        let mut pump = MarketEventsPump::new(future.clone(), etf, source);

        assert!(!pump.process_market_events(0.2));
        assert!(future.borrow().best_bid().is_none());

        assert!(!pump.process_market_events(1.0));
        assert_eq!(future.borrow().best_bid(), Some(100));
    }

    #[test]
    fn amend_applies_a_negative_delta() {
        let future = Rc::new(RefCell::new(OrderBook::new(Instrument::Future, FeeRates::new(-0.0001, 0.0002))));
        let etf = Rc::new(RefCell::new(OrderBook::new(Instrument::Etf, FeeRates::new(-0.0001, 0.0002))));
        let mut events = VecDeque::from([insert_event(0.0, 1, Side::Buy, 100, 10)]);
        events.push_back(MarketEvent {
            time: 0.1,
            instrument: Instrument::Future,
            operation: MarketEventOperation::Amend,
            order_id: 1,
            side: Side::Buy,
            volume: -4,
            price: 100,
            lifespan: Lifespan::GoodForDay,
        });
        let source = Box::new(QueueSource(events));
        let mut pump = MarketEventsPump::new(future.clone(), etf, source);
        pump.process_market_events(1.0);
        assert_eq!(future.borrow().top_levels().bid_volumes[0], 6);
    }

    #[test]
    fn source_exhaustion_is_reported_once() {
        let future = Rc::new(RefCell::new(OrderBook::new(Instrument::Future, FeeRates::new(-0.0001, 0.0002))));
        let etf = Rc::new(RefCell::new(OrderBook::new(Instrument::Etf, FeeRates::new(-0.0001, 0.0002))));
        let source = Box::new(QueueSource(VecDeque::new()));
        let mut pump = MarketEventsPump::new(future, etf, source);
        assert!(pump.process_market_events(1.0));
        assert!(pump.is_complete());
    }
}
