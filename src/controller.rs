/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Top-level match orchestration: admits competitors, drives the timer
//! tick, aggregates trade ticks, replays market data, and sequences
//! shutdown. No socket or datagram IO lives here (that belongs to an
//! external execution/information channel); this module only holds the
//! scheduling and bookkeeping the original controller wraps around it.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::account::AccountConfig;
use crate::book::{FeeRates, OrderBook};
use crate::competitor::{Competitor, Limits};
use crate::config::MatchConfig;
use crate::limiter::FrequencyLimiter;
use crate::match_events::MatchEventSink;
use crate::market_events::{MarketEventSource, MarketEventsPump};
use crate::types::{Instrument, Price, Volume};

/// One instrument's top-of-book plus any trades since the last
/// dissemination; handed to an external information channel, which is
/// responsible for actually encoding and broadcasting it.
#[derive(Debug, Clone, PartialEq)]
pub struct DisseminationFrame {
    pub instrument: Instrument,
    pub sequence_number: u32,
    pub top: crate::book::TopLevels,
    pub trade_ticks: Vec<(Price, Volume)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Continue {
        next_tick_time: f64,
        frames: Vec<DisseminationFrame>,
    },
    Shutdown {
        reason: String,
    },
}

/// Delay between the server accepting connections and the market opening,
/// giving auto-traders time to connect.
pub const MARKET_OPEN_DELAY_SECONDS: f64 = 20.0;

pub struct Controller {
    config: MatchConfig,
    etf_book: Rc<RefCell<OrderBook>>,
    future_book: Rc<RefCell<OrderBook>>,
    competitors: RefCell<HashMap<String, Rc<Competitor>>>,
    competitor_count: Cell<usize>,
    market_events: RefCell<MarketEventsPump>,
    match_events: Rc<dyn MatchEventSink>,
    future_trade_ticks: Rc<RefCell<BTreeMap<Price, Volume>>>,
    etf_trade_ticks: Rc<RefCell<BTreeMap<Price, Volume>>>,
    start_time: Cell<f64>,
    done: Cell<bool>,
    sequence_number: Cell<u32>,
    tick_interval: f64,
}

impl Controller {
    pub fn new(config: MatchConfig, market_data: Box<dyn MarketEventSource>, match_events: Rc<dyn MatchEventSink>) -> Self {
        let etf_book = Rc::new(RefCell::new(OrderBook::new(
            Instrument::Etf,
            FeeRates::new(config.fees.maker, config.fees.taker),
        )));
        let future_book = Rc::new(RefCell::new(OrderBook::new(Instrument::Future, FeeRates::new(0.0, 0.0))));

        let future_trade_ticks = Rc::new(RefCell::new(BTreeMap::new()));
        let etf_trade_ticks = Rc::new(RefCell::new(BTreeMap::new()));
        {
            let ticks = future_trade_ticks.clone();
            future_book
                .borrow_mut()
                .set_trade_listener(Rc::new(move |price, volume| {
                    *ticks.borrow_mut().entry(price).or_insert(0) += volume;
                }));
        }
        {
            let ticks = etf_trade_ticks.clone();
            etf_book
                .borrow_mut()
                .set_trade_listener(Rc::new(move |price, volume| {
                    *ticks.borrow_mut().entry(price).or_insert(0) += volume;
                }));
        }

        let market_events = MarketEventsPump::new(future_book.clone(), etf_book.clone(), market_data);
        let tick_interval = config.engine.tick_interval / config.engine.speed;

        Self {
            config,
            etf_book,
            future_book,
            competitors: RefCell::new(HashMap::new()),
            competitor_count: Cell::new(0),
            market_events: RefCell::new(market_events),
            match_events,
            future_trade_ticks,
            etf_trade_ticks,
            start_time: Cell::new(0.0),
            done: Cell::new(false),
            sequence_number: Cell::new(1),
            tick_interval,
        }
    }

    pub fn etf_book(&self) -> &Rc<RefCell<OrderBook>> {
        &self.etf_book
    }

    pub fn future_book(&self) -> &Rc<RefCell<OrderBook>> {
        &self.future_book
    }

    /// Admits a new connection, handing back the frequency limiter it
    /// should be policed with. Counts toward the shutdown-on-empty check
    /// even before the competitor logs in.
    pub fn on_new_connection(&self) -> FrequencyLimiter {
        self.competitor_count.set(self.competitor_count.get() + 1);
        FrequencyLimiter::new(
            self.config.limits.message_frequency_interval / self.config.engine.speed,
            self.config.limits.message_frequency_limit,
        )
    }

    pub fn on_connection_lost(&self) {
        self.competitor_count.set(self.competitor_count.get().saturating_sub(1));
    }

    /// Validates a login and, on success, registers a new competitor.
    /// Returns `None` for an unknown name, a wrong secret, or a name
    /// already logged in, mirroring the original's single combined check.
    pub fn admit_competitor(&self, name: &str, secret: &str) -> Option<Rc<Competitor>> {
        if self.competitors.borrow().contains_key(name) {
            return None;
        }
        let expected = self.config.traders.get(name)?;
        if expected != secret {
            return None;
        }

        let limits = Limits {
            tick_size: self.config.instrument.tick_size,
            position_limit: self.config.limits.position_limit,
            active_order_count_limit: self.config.limits.active_order_count_limit,
            active_volume_limit: self.config.limits.active_volume_limit,
        };
        let account_config = AccountConfig {
            etf_clamp: self.config.instrument.etf_clamp,
            tick_size: self.config.instrument.tick_size,
        };
        let market_open = self.start_time.get() != 0.0;
        let competitor = Competitor::new(
            name.to_string(),
            limits,
            account_config,
            self.etf_book.clone(),
            self.future_book.clone(),
            self.match_events.clone(),
            market_open,
        );

        if market_open {
            tracing::warn!(competitor = name, "competitor logged in after market open");
            competitor.set_start_time(self.start_time.get());
        }
        tracing::info!(competitor = name, "competitor is ready");
        self.competitors.borrow_mut().insert(name.to_string(), competitor.clone());
        Some(competitor)
    }

    /// Opens the market: every registered competitor's clock starts now,
    /// and the first timer tick is due immediately.
    pub fn open_market(&self, now: f64) {
        self.start_time.set(now);
        for competitor in self.competitors.borrow().values() {
            competitor.set_start_time(now);
            competitor.set_market_open(true);
        }
        tracing::info!("market open");
    }

    /// Runs one timer tick: replays due market events, marks every
    /// competitor to market, and (unless shutting down) produces the next
    /// dissemination frames and reschedule time. `tick_time` is when this
    /// tick was originally due; `now` is the actual wall-clock time it
    /// fired, which may be later under load, in which case ticks are
    /// skipped to catch back up.
    pub fn on_timer_tick(&self, now: f64, tick_time: f64) -> TickOutcome {
        if self.competitor_count.get() == 0 {
            return self.shutdown(now, "no remaining competitors");
        }

        let elapsed = (now - self.start_time.get()) * self.config.engine.speed;
        self.market_events.borrow_mut().process_market_events(elapsed);
        for competitor in self.competitors.borrow().values() {
            competitor.on_timer_tick(elapsed, self.future_book.borrow().last_traded_price(), self.etf_book.borrow().last_traded_price());
        }

        if self.market_events.borrow().is_complete() {
            return self.shutdown(now, "match complete");
        }

        let skipped_ticks = ((now - tick_time) / self.tick_interval).floor();
        let sequence_number = self.sequence_number.get() + skipped_ticks as u32;

        let mut frames = Vec::with_capacity(2);
        for (instrument, book, ticks) in [
            (Instrument::Future, &self.future_book, &self.future_trade_ticks),
            (Instrument::Etf, &self.etf_book, &self.etf_trade_ticks),
        ] {
            let top = book.borrow().top_levels();
            let trade_ticks: Vec<(Price, Volume)> = ticks.borrow().iter().map(|(&p, &v)| (p, v)).collect();
            ticks.borrow_mut().clear();
            frames.push(DisseminationFrame {
                instrument,
                sequence_number,
                top,
                trade_ticks,
            });
        }

        let next_tick_time = tick_time + self.tick_interval + self.tick_interval * skipped_ticks;
        self.sequence_number.set(sequence_number + 1);
        TickOutcome::Continue { next_tick_time, frames }
    }

    fn shutdown(&self, now: f64, reason: &str) -> TickOutcome {
        self.done.set(true);
        let elapsed = (now - self.start_time.get()) * self.config.engine.speed;
        tracing::info!(elapsed, reason, "shutting down the match");
        for competitor in self.competitors.borrow().values() {
            competitor.disconnect(elapsed);
        }
        TickOutcome::Shutdown { reason: reason.to_string() }
    }

    pub fn is_done(&self) -> bool {
        self.done.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, ExecutionConfig, FeesConfig, InformationConfig, InstrumentConfig, LimitsConfig};
    use crate::match_events::MatchEventRecord;
    use crate::market_events::MarketEvent;
    use std::collections::VecDeque;

    struct NoopSink;
    impl MatchEventSink for NoopSink {
        fn record(&self, _event: MatchEventRecord) {}
    }

    struct EmptySource;
    impl MarketEventSource for EmptySource {
        fn next_event(&mut self) -> Option<MarketEvent> {
            None
        }
    }

    fn config() -> MatchConfig {
        MatchConfig {
            engine: EngineConfig {
                market_data_file: "market.csv".into(),
                match_events_file: "events.csv".into(),
                speed: 1.0,
                tick_interval: 0.25,
            },
            execution: ExecutionConfig {
                listen_address: "127.0.0.1".into(),
                port: 9999,
            },
            fees: FeesConfig { maker: -0.0001, taker: 0.0002 },
            information: InformationConfig {
                host: "127.0.0.1".into(),
                port: 9998,
                interface: None,
                allow_broadcast: false,
            },
            instrument: InstrumentConfig { tick_size: 100, etf_clamp: 0.1 },
            limits: LimitsConfig {
                active_order_count_limit: 10,
                active_volume_limit: 200,
                message_frequency_interval: 1.0,
                message_frequency_limit: 50,
                position_limit: 100,
            },
            traders: HashMap::from([("alice".to_string(), "secret".to_string())]),
        }
    }

    fn controller() -> Controller {
        Controller::new(config(), Box::new(EmptySource), Rc::new(NoopSink))
    }

    #[test]
    fn wrong_secret_is_refused() {
        let c = controller();
        assert!(c.admit_competitor("alice", "wrong").is_none());
    }

    #[test]
    fn unknown_name_is_refused() {
        let c = controller();
        assert!(c.admit_competitor("mallory", "secret").is_none());
    }

    #[test]
    fn valid_login_registers_the_competitor() {
        let c = controller();
        let competitor = c.admit_competitor("alice", "secret");
        assert!(competitor.is_some());
        assert!(c.admit_competitor("alice", "secret").is_none());
    }

    #[test]
    fn shuts_down_when_no_competitors_remain() {
        let c = controller();
        let outcome = c.on_timer_tick(0.0, 0.0);
        assert!(matches!(outcome, TickOutcome::Shutdown { .. }));
    }

    #[test]
    fn ticks_with_an_active_competitor_continue() {
        let c = controller();
        c.admit_competitor("alice", "secret");
        c.on_new_connection();
        c.open_market(0.0);
        let outcome = c.on_timer_tick(0.0, 0.0);
        match outcome {
            TickOutcome::Continue { frames, next_tick_time } => {
                assert_eq!(frames.len(), 2);
                assert!(next_tick_time > 0.0);
            }
            TickOutcome::Shutdown { .. } => panic!("expected the match to continue"),
        }
    }
}
