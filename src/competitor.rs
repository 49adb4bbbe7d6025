/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Competitor state machine: request validation, fill handling, auto-hedge,
//! and the soft/hard-breach error tiers.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::account::{Account, AccountConfig};
use crate::book::{NewOrder, Order, OrderBook, OrderListener, OrderToken};
use crate::error::{HardBreach, OrderRejection};
use crate::match_events::{AccountSnapshot, MatchEventRecord, MatchEventSink};
use crate::protocol::{AmendMessage, CancelMessage, InsertMessage};
use crate::types::{ClientOrderId, Fee, Instrument, Lifespan, Price, Side, Volume};

/// Risk limits applied to every insert request.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub tick_size: Price,
    pub position_limit: i64,
    pub active_order_count_limit: usize,
    pub active_volume_limit: Volume,
}

/// An external collaborator that delivers wire messages back to the
/// competitor's socket. No implementation lives in this crate (opening a
/// socket is out of scope); this models the shape of that contract so the
/// state machine can be exercised and tested without one.
pub trait ExecutionChannel {
    fn send_error(&self, client_order_id: ClientOrderId, message: &str);
    fn send_order_status(&self, client_order_id: ClientOrderId, fill_volume: Volume, remaining_volume: Volume, fees: Fee);
    fn send_position_change(&self, future_position: i64, etf_position: i64);
    fn close(&self);
}

#[derive(Debug, Clone, Copy)]
struct LiveOrder {
    token: OrderToken,
    side: Side,
    price: Price,
    volume: Volume,
}

/// One competitor's order-validation pipeline, account and auto-hedging.
/// Always held as `Rc<Competitor>`: it registers itself as the
/// [`OrderListener`] on every order it inserts, so it must be able to hand
/// out a shared handle to itself from inside `&self` methods.
pub struct Competitor {
    name: String,
    account: RefCell<Account>,
    etf_book: Rc<RefCell<OrderBook>>,
    future_book: Rc<RefCell<OrderBook>>,
    limits: Limits,
    live_orders: RefCell<HashMap<ClientOrderId, LiveOrder>>,
    last_insert_id: Cell<Option<ClientOrderId>>,
    market_open: Cell<bool>,
    start_time: Cell<f64>,
    exec_channel: RefCell<Option<Box<dyn ExecutionChannel>>>,
    match_events: Rc<dyn MatchEventSink>,
    finished: Cell<bool>,
    self_ref: Weak<Competitor>,
    /// Reference prices captured just before an amend/cancel takes the
    /// book's mutable borrow, so `on_order_amended`/`on_order_cancelled`
    /// (invoked synchronously from inside that borrow) can read them
    /// without re-borrowing `etf_book` and panicking.
    pending_reference_prices: Cell<(Price, Price)>,
}

impl Competitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        limits: Limits,
        account_config: AccountConfig,
        etf_book: Rc<RefCell<OrderBook>>,
        future_book: Rc<RefCell<OrderBook>>,
        match_events: Rc<dyn MatchEventSink>,
        market_open: bool,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            name,
            account: RefCell::new(Account::new(account_config)),
            etf_book,
            future_book,
            limits,
            live_orders: RefCell::new(HashMap::new()),
            last_insert_id: Cell::new(None),
            market_open: Cell::new(market_open),
            start_time: Cell::new(0.0),
            exec_channel: RefCell::new(None),
            match_events,
            finished: Cell::new(false),
            self_ref: weak.clone(),
            pending_reference_prices: Cell::new((0, 0)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account(&self) -> Account {
        *self.account.borrow()
    }

    pub fn attach_execution_channel(&self, channel: Box<dyn ExecutionChannel>) {
        *self.exec_channel.borrow_mut() = Some(channel);
    }

    pub fn set_market_open(&self, open: bool) {
        self.market_open.set(open);
    }

    /// Called by the controller when a competitor logs in after the
    /// market has already opened, so their elapsed-time clock starts
    /// caught up rather than at zero.
    pub fn set_start_time(&self, now: f64) {
        self.start_time.set(now);
        tracing::warn!(competitor = %self.name, now, "competitor joined after market open, start time backfilled");
    }

    pub fn start_time(&self) -> f64 {
        self.start_time.get()
    }

    pub fn on_timer_tick(&self, now: f64, future_last_traded: Option<Price>, etf_last_traded: Option<Price>) {
        let future_price = future_last_traded.unwrap_or(0);
        let etf_price = etf_last_traded.unwrap_or(0);
        self.account.borrow_mut().mark_to_market(future_price, etf_price);
        let snapshot = self.account_snapshot();
        self.match_events
            .record(MatchEventRecord::tick(now, self.name.clone(), snapshot, future_price, etf_price));
    }

    pub fn on_insert_message(&self, now: f64, msg: InsertMessage) {
        if let Some(last) = self.last_insert_id.get() {
            if msg.client_order_id <= last {
                self.reject(msg.client_order_id, OrderRejection::DuplicateOrOutOfOrderInsertId);
                return;
            }
        }
        self.last_insert_id.set(Some(msg.client_order_id));

        let side = match msg.side {
            0 => Side::Sell,
            1 => Side::Buy,
            other => {
                self.reject(msg.client_order_id, OrderRejection::InvalidSide(other));
                return;
            }
        };
        let lifespan = match msg.lifespan {
            0 => Lifespan::FillAndKill,
            1 => Lifespan::GoodForDay,
            other => {
                self.reject(msg.client_order_id, OrderRejection::InvalidLifespan(other));
                return;
            }
        };
        let price = msg.price as Price;
        if price % self.limits.tick_size != 0 {
            self.reject(msg.client_order_id, OrderRejection::InvalidTickSize);
            return;
        }
        if self.live_orders.borrow().len() >= self.limits.active_order_count_limit {
            self.reject(msg.client_order_id, OrderRejection::ActiveOrderCountLimitBreached);
            return;
        }
        if msg.volume < 1 {
            self.reject(msg.client_order_id, OrderRejection::InvalidVolume);
            return;
        }
        let requested_volume = msg.volume as Volume;
        let active_volume: Volume = self.live_orders.borrow().values().map(|o| o.volume).sum();
        if active_volume + requested_volume > self.limits.active_volume_limit {
            self.reject(msg.client_order_id, OrderRejection::ActiveVolumeLimitBreached);
            return;
        }
        if !self.market_open.get() {
            self.reject(msg.client_order_id, OrderRejection::MarketNotYetOpen);
            return;
        }
        let crosses_own_order = self.live_orders.borrow().values().any(|o| match side {
            Side::Buy => o.side == Side::Sell && price >= o.price,
            Side::Sell => o.side == Side::Buy && price <= o.price,
        });
        if crosses_own_order {
            self.reject(msg.client_order_id, OrderRejection::SelfCross);
            return;
        }

        // Captured before the order touches the book: a crossing order's own
        // fills would otherwise move the account balance and the etf book's
        // last-traded price ahead of what this insert event should show.
        let snapshot = self.account_snapshot();
        let (future_price, etf_price) = self.reference_prices();

        let me = self.self_ref.upgrade().expect("competitor outlives its own Rc handle");
        let order_rc = self.etf_book.borrow_mut().insert(
            now,
            NewOrder {
                client_order_id: msg.client_order_id,
                side,
                lifespan,
                price,
                volume: requested_volume,
                listener: Some(me),
            },
        );

        {
            let order = order_rc.borrow();
            if order.remaining_volume > 0 {
                self.live_orders.borrow_mut().insert(
                    msg.client_order_id,
                    LiveOrder {
                        token: order.token,
                        side: order.side,
                        price: order.price,
                        volume: order.volume,
                    },
                );
            }
        }

        self.match_events.record(MatchEventRecord::insert(
            now,
            self.name.clone(),
            snapshot,
            future_price,
            etf_price,
            msg.client_order_id,
            side,
            price,
            requested_volume,
            lifespan,
        ));
    }

    pub fn on_amend_message(&self, now: f64, msg: AmendMessage) {
        if self.last_insert_id.get().map_or(true, |last| msg.client_order_id > last) {
            self.reject(msg.client_order_id, OrderRejection::OutOfOrderAmendId);
            return;
        }
        let Some(live) = self.live_orders.borrow().get(&msg.client_order_id).copied() else {
            return;
        };
        let new_volume = msg.volume as Volume;
        if new_volume > live.volume {
            self.reject(msg.client_order_id, OrderRejection::AmendWouldIncreaseVolume);
            return;
        }
        // Captured before the borrow: `on_order_amended` fires synchronously
        // from inside `amend` and cannot safely re-borrow `etf_book` itself.
        self.pending_reference_prices.set(self.reference_prices());
        let _ = self.etf_book.borrow_mut().amend(now, live.token, new_volume);
    }

    pub fn on_cancel_message(&self, now: f64, msg: CancelMessage) {
        if self.last_insert_id.get().map_or(true, |last| msg.client_order_id > last) {
            self.reject(msg.client_order_id, OrderRejection::OutOfOrderCancelId);
            return;
        }
        let Some(live) = self.live_orders.borrow().get(&msg.client_order_id).copied() else {
            return;
        };
        self.pending_reference_prices.set(self.reference_prices());
        let _ = self.etf_book.borrow_mut().cancel(now, live.token);
    }

    /// Records a disconnect event (once) and cancels every resting order,
    /// which itself drives further `Cancel` match events via the listener
    /// callbacks. Matches the original ordering: record first, then
    /// unwind.
    pub fn disconnect(&self, now: f64) {
        if !self.finished.get() {
            self.finished.set(true);
            let snapshot = self.account_snapshot();
            let (future_price, etf_price) = self.reference_prices();
            self.match_events
                .record(MatchEventRecord::disconnect(now, self.name.clone(), snapshot, future_price, etf_price));
        }
        *self.exec_channel.borrow_mut() = None;
        let tokens: Vec<OrderToken> = self.live_orders.borrow().values().map(|o| o.token).collect();
        // Cancelling never moves the last-traded price, so one capture
        // upfront covers every `on_order_cancelled` fired by the loop below.
        self.pending_reference_prices.set(self.reference_prices());
        for token in tokens {
            let _ = self.etf_book.borrow_mut().cancel(now, token);
        }
    }

    fn reject(&self, client_order_id: ClientOrderId, reason: OrderRejection) {
        if let Some(channel) = self.exec_channel.borrow().as_ref() {
            channel.send_error(client_order_id, &reason.to_string());
        }
        tracing::debug!(competitor = %self.name, client_order_id, reason = %reason, "order rejected");
    }

    /// `future_price`/`etf_price` are passed in rather than derived from
    /// `self.reference_prices()`: the only call site runs inside
    /// `on_order_filled`, itself reentrant under a mutable borrow of
    /// `etf_book`, so a fresh `etf_book.borrow()` here would panic.
    fn hard_breach(&self, now: f64, reason: HardBreach, future_price: Price, etf_price: Price) {
        if let Some(channel) = self.exec_channel.borrow().as_ref() {
            channel.send_error(0, &reason.to_string());
            channel.close();
        }
        *self.exec_channel.borrow_mut() = None;
        let snapshot = self.account_snapshot();
        self.match_events
            .record(MatchEventRecord::breach(now, self.name.clone(), snapshot, future_price, etf_price));
        tracing::warn!(competitor = %self.name, reason = %reason, "hard breach");
    }

    fn send_order_status(&self, order: &Order) {
        if let Some(channel) = self.exec_channel.borrow().as_ref() {
            channel.send_order_status(order.client_order_id, order.fill_volume(), order.remaining_volume, order.total_fees);
        }
    }

    fn send_position_change(&self) {
        if let Some(channel) = self.exec_channel.borrow().as_ref() {
            let account = self.account.borrow();
            channel.send_position_change(account.future_position(), account.etf_position());
        }
    }

    fn account_snapshot(&self) -> AccountSnapshot {
        let account = self.account.borrow();
        AccountSnapshot {
            balance: account.balance(),
            future_position: account.future_position(),
            etf_position: account.etf_position(),
            profit_or_loss: account.profit_or_loss(),
            total_fees: account.total_fees(),
            max_drawdown: account.max_drawdown(),
            buy_volume: account.etf_buy_volume(),
            sell_volume: account.etf_sell_volume(),
        }
    }

    fn reference_prices(&self) -> (Price, Price) {
        (
            self.future_book.borrow().last_traded_price().unwrap_or(0),
            self.etf_book.borrow().last_traded_price().unwrap_or(0),
        )
    }
}

impl OrderListener for Competitor {
    /// Fires only for a fresh, wholly-unfilled GFD order settling onto the
    /// book: a residual left over from a partial fill already got its
    /// status sent by `on_order_filled` and does not fire this callback
    /// at all (see `OrderBook::place`).
    fn on_order_placed(&self, _now: f64, order: &Order) {
        self.send_order_status(order);
    }

    fn on_order_amended(&self, now: f64, order: &Order, volume_removed: Volume) {
        {
            let mut orders = self.live_orders.borrow_mut();
            if order.remaining_volume == 0 {
                orders.remove(&order.client_order_id);
            } else if let Some(live) = orders.get_mut(&order.client_order_id) {
                live.volume = order.volume;
            }
        }
        self.send_order_status(order);
        let snapshot = self.account_snapshot();
        let (future_price, etf_price) = self.pending_reference_prices.get();
        self.match_events.record(MatchEventRecord::amend(
            now,
            self.name.clone(),
            snapshot,
            future_price,
            etf_price,
            order.client_order_id,
            volume_removed,
        ));
    }

    fn on_order_cancelled(&self, now: f64, order: &Order, volume_removed: Volume) {
        self.live_orders.borrow_mut().remove(&order.client_order_id);
        self.send_order_status(order);
        let snapshot = self.account_snapshot();
        let (future_price, etf_price) = self.pending_reference_prices.get();
        self.match_events.record(MatchEventRecord::cancel(
            now,
            self.name.clone(),
            snapshot,
            future_price,
            etf_price,
            order.client_order_id,
            volume_removed,
        ));
    }

    fn on_order_filled(&self, now: f64, order: &Order, price: Price, volume: Volume, fee: Fee) {
        debug_assert_eq!(order.instrument, Instrument::Etf, "competitors only ever insert ETF orders");

        self.account.borrow_mut().transact(Instrument::Etf, order.side, price, volume, fee);
        let future_price = self.future_book.borrow().last_traded_price().unwrap_or(0);
        self.account.borrow_mut().mark_to_market(future_price, price);

        let hedge_side = order.side.opposite();
        match self.future_book.borrow().midpoint_price() {
            Some(midpoint) => {
                self.account.borrow_mut().transact(Instrument::Future, hedge_side, midpoint, volume, 0);
                let future_price = self.future_book.borrow().last_traded_price().unwrap_or(0);
                self.account.borrow_mut().mark_to_market(future_price, price);
                let snapshot = self.account_snapshot();
                self.match_events.record(MatchEventRecord::hedge(
                    now,
                    self.name.clone(),
                    snapshot,
                    future_price,
                    price,
                    hedge_side,
                    midpoint,
                    volume,
                ));
            }
            None => {
                tracing::warn!(
                    competitor = %self.name,
                    "FUTURE book is one-sided, skipping hedge price but still recording the fill"
                );
            }
        }

        // `price` doubles as the fill's own etf reference price (the trade
        // just happened at it); re-deriving it via `self.reference_prices()`
        // would re-borrow `etf_book` while this callback is itself reentrant
        // under `etf_book`'s mutable borrow, and would panic.
        let future_price = self.future_book.borrow().last_traded_price().unwrap_or(0);
        let snapshot = self.account_snapshot();
        self.match_events.record(MatchEventRecord::fill(
            now,
            self.name.clone(),
            snapshot,
            future_price,
            order.client_order_id,
            order.side,
            price,
            volume,
            fee,
        ));
        self.send_order_status(order);
        self.send_position_change();

        if order.remaining_volume == 0 {
            self.live_orders.borrow_mut().remove(&order.client_order_id);
        }

        if self.account.borrow().etf_position().abs() > self.limits.position_limit {
            self.hard_breach(now, HardBreach::PositionLimit, future_price, price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::FeeRates;
    use std::cell::RefCell as StdRefCell;

    fn books() -> (Rc<RefCell<OrderBook>>, Rc<RefCell<OrderBook>>) {
        let rates = FeeRates::new(-0.0001, 0.0002);
        (
            Rc::new(RefCell::new(OrderBook::new(Instrument::Etf, rates))),
            Rc::new(RefCell::new(OrderBook::new(Instrument::Future, rates))),
        )
    }

    fn limits() -> Limits {
        Limits {
            tick_size: 100,
            position_limit: 100,
            active_order_count_limit: 10,
            active_volume_limit: 200,
        }
    }

    fn account_config() -> AccountConfig {
        AccountConfig {
            etf_clamp: 0.1,
            tick_size: 100,
        }
    }

    struct RecordingSink {
        records: StdRefCell<Vec<MatchEventRecord>>,
    }
    impl MatchEventSink for RecordingSink {
        fn record(&self, event: MatchEventRecord) {
            self.records.borrow_mut().push(event);
        }
    }

    struct RecordingChannel {
        errors: Rc<StdRefCell<Vec<(ClientOrderId, String)>>>,
        statuses: Rc<StdRefCell<Vec<(ClientOrderId, Volume, Volume, Fee)>>>,
    }
    impl ExecutionChannel for RecordingChannel {
        fn send_error(&self, client_order_id: ClientOrderId, message: &str) {
            self.errors.borrow_mut().push((client_order_id, message.to_string()));
        }
        fn send_order_status(&self, client_order_id: ClientOrderId, fill_volume: Volume, remaining_volume: Volume, fees: Fee) {
            self.statuses.borrow_mut().push((client_order_id, fill_volume, remaining_volume, fees));
        }
        fn send_position_change(&self, _: i64, _: i64) {}
        fn close(&self) {}
    }

    fn recording_channel() -> Box<RecordingChannel> {
        Box::new(RecordingChannel {
            errors: Rc::new(StdRefCell::new(Vec::new())),
            statuses: Rc::new(StdRefCell::new(Vec::new())),
        })
    }

    /// Returns a channel alongside a shared handle to its recorded
    /// statuses, so a test can inspect them after the channel itself has
    /// been moved into the competitor.
    fn recording_channel_with_handle() -> (Box<RecordingChannel>, Rc<StdRefCell<Vec<(ClientOrderId, Volume, Volume, Fee)>>>) {
        let statuses = Rc::new(StdRefCell::new(Vec::new()));
        let channel = Box::new(RecordingChannel {
            errors: Rc::new(StdRefCell::new(Vec::new())),
            statuses: statuses.clone(),
        });
        (channel, statuses)
    }

    fn new_competitor() -> Rc<Competitor> {
        let (etf, future) = books();
        let sink: Rc<dyn MatchEventSink> = Rc::new(RecordingSink { records: StdRefCell::new(Vec::new()) });
        Competitor::new("alice".into(), limits(), account_config(), etf, future, sink, true)
    }

    #[test]
    fn tick_size_violation_is_rejected() {
        let competitor = new_competitor();
        competitor.attach_execution_channel(recording_channel());
        competitor.on_insert_message(
            0.0,
            InsertMessage {
                client_order_id: 1,
                side: 1,
                price: 150,
                volume: 10,
                lifespan: 1,
            },
        );
        assert!(competitor.live_orders.borrow().is_empty());
    }

    #[test]
    fn out_of_order_amend_is_rejected() {
        let competitor = new_competitor();
        competitor.on_amend_message(0.0, AmendMessage { client_order_id: 5, volume: 1 });
        // no insert has happened yet, so last_insert_id is None and any amend is out of order.
        assert!(competitor.live_orders.borrow().is_empty());
    }

    #[test]
    fn valid_insert_rests_on_the_book() {
        let competitor = new_competitor();
        competitor.on_insert_message(
            0.0,
            InsertMessage {
                client_order_id: 1,
                side: 1,
                price: 100,
                volume: 10,
                lifespan: 1,
            },
        );
        assert_eq!(competitor.live_orders.borrow().len(), 1);
    }

    #[test]
    fn self_cross_is_rejected() {
        let competitor = new_competitor();
        competitor.on_insert_message(
            0.0,
            InsertMessage {
                client_order_id: 1,
                side: 1,
                price: 100,
                volume: 10,
                lifespan: 1,
            },
        );
        competitor.on_insert_message(
            0.0,
            InsertMessage {
                client_order_id: 2,
                side: 0,
                price: 100,
                volume: 5,
                lifespan: 1,
            },
        );
        assert_eq!(competitor.live_orders.borrow().len(), 1);
    }

    #[test]
    fn unfilled_resting_insert_sends_exactly_one_status_via_on_order_placed() {
        let competitor = new_competitor();
        let (channel, statuses) = recording_channel_with_handle();
        competitor.attach_execution_channel(channel);
        competitor.on_insert_message(
            0.0,
            InsertMessage {
                client_order_id: 1,
                side: 1,
                price: 100,
                volume: 10,
                lifespan: 1,
            },
        );
        let sent = statuses.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], (1, 0, 10, 0));
    }

    #[test]
    fn partial_fill_residual_sends_exactly_one_status_via_on_order_filled() {
        let (etf, future) = books();
        let sink: Rc<dyn MatchEventSink> = Rc::new(RecordingSink { records: StdRefCell::new(Vec::new()) });
        let competitor = Competitor::new("alice".into(), limits(), account_config(), etf.clone(), future.clone(), sink.clone(), true);
        let (channel, statuses) = recording_channel_with_handle();
        competitor.attach_execution_channel(channel);
        competitor.on_insert_message(
            0.0,
            InsertMessage {
                client_order_id: 1,
                side: 1,
                price: 100,
                volume: 10,
                lifespan: 1,
            },
        );
        statuses.borrow_mut().clear();

        let aggressor = Competitor::new("bob".into(), limits(), account_config(), etf, future, sink, true);
        let (aggressor_channel, _) = recording_channel_with_handle();
        aggressor.attach_execution_channel(aggressor_channel);
        aggressor.on_insert_message(
            1.0,
            InsertMessage {
                client_order_id: 1,
                side: 0,
                price: 100,
                volume: 4,
                lifespan: 0,
            },
        );

        let sent = statuses.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], (1, 4, 6, 0));
    }

    #[test]
    fn amend_increasing_volume_is_rejected() {
        let competitor = new_competitor();
        let (channel, _) = recording_channel_with_handle();
        competitor.attach_execution_channel(channel);
        competitor.on_insert_message(
            0.0,
            InsertMessage {
                client_order_id: 1,
                side: 1,
                price: 100,
                volume: 10,
                lifespan: 1,
            },
        );
        competitor.on_amend_message(1.0, AmendMessage { client_order_id: 1, volume: 20 });
        assert_eq!(competitor.live_orders.borrow().get(&1).unwrap().volume, 10);
    }
}
