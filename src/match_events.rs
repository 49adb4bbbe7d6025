/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Match-event records: the audit trail of every order action, trade,
//! hedge, breach, disconnect and tick during a match.
//!
//! No CSV writer lives here (file IO is an external collaborator's job);
//! this module only defines the record shape and the sink it is handed to,
//! matching the header columns of the original implementation's events
//! file: Time, Competitor, Operation, OrderId, Side, Volume, Price,
//! Lifespan, Fee, FuturePrice, EtfPrice, AccountBalance, FuturePosition,
//! EtfPosition, ProfitLoss, TotalFees, MaxDrawdown, BuyVolume, SellVolume.

use crate::types::{ClientOrderId, Fee, Lifespan, Price, Side, Volume};

/// What kind of thing happened. Each variant below documents which of
/// [`MatchEventRecord`]'s optional fields it populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOperation {
    Amend,
    Breach,
    Cancel,
    Disconnect,
    Fill,
    Hedge,
    Insert,
    Tick,
}

/// A single row of the match-events audit trail. Optional fields are
/// `None` exactly where the original leaves them blank for a given
/// [`MatchOperation`] (e.g. `side`/`lifespan` are always `None` on
/// `Tick`/`Breach`/`Disconnect` records).
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEventRecord {
    pub time: f64,
    pub competitor: Option<String>,
    pub operation: MatchOperation,
    pub order_id: Option<ClientOrderId>,
    pub side: Option<Side>,
    /// Signed volume change: negative for amend/cancel reductions and for
    /// a fill consuming volume, positive for an insert or a hedge.
    pub volume: Option<i64>,
    pub price: Option<Price>,
    pub lifespan: Option<Lifespan>,
    pub fee: Fee,
    pub future_price: Price,
    pub etf_price: Price,
    pub balance: i64,
    pub future_position: i64,
    pub etf_position: i64,
    pub profit_or_loss: i64,
    pub total_fees: Fee,
    pub max_drawdown: i64,
    pub buy_volume: Volume,
    pub sell_volume: Volume,
}

/// Per-account fields shared by most event constructors below, so callers
/// only have to assemble this once per fill/tick/etc.
#[derive(Debug, Clone, Copy)]
pub struct AccountSnapshot {
    pub balance: i64,
    pub future_position: i64,
    pub etf_position: i64,
    pub profit_or_loss: i64,
    pub total_fees: Fee,
    pub max_drawdown: i64,
    pub buy_volume: Volume,
    pub sell_volume: Volume,
}

impl MatchEventRecord {
    fn base(time: f64, operation: MatchOperation, competitor: Option<String>, snapshot: AccountSnapshot, future_price: Price, etf_price: Price) -> Self {
        Self {
            time,
            competitor,
            operation,
            order_id: None,
            side: None,
            volume: None,
            price: None,
            lifespan: None,
            fee: 0,
            future_price,
            etf_price,
            balance: snapshot.balance,
            future_position: snapshot.future_position,
            etf_position: snapshot.etf_position,
            profit_or_loss: snapshot.profit_or_loss,
            total_fees: snapshot.total_fees,
            max_drawdown: snapshot.max_drawdown,
            buy_volume: snapshot.buy_volume,
            sell_volume: snapshot.sell_volume,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn amend(
        time: f64,
        competitor: String,
        snapshot: AccountSnapshot,
        future_price: Price,
        etf_price: Price,
        order_id: ClientOrderId,
        volume_removed: Volume,
    ) -> Self {
        let mut rec = Self::base(time, MatchOperation::Amend, Some(competitor), snapshot, future_price, etf_price);
        rec.order_id = Some(order_id);
        rec.volume = Some(-(volume_removed as i64));
        rec
    }

    pub fn breach(time: f64, competitor: String, snapshot: AccountSnapshot, future_price: Price, etf_price: Price) -> Self {
        Self::base(time, MatchOperation::Breach, Some(competitor), snapshot, future_price, etf_price)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn cancel(
        time: f64,
        competitor: String,
        snapshot: AccountSnapshot,
        future_price: Price,
        etf_price: Price,
        order_id: ClientOrderId,
        volume_removed: Volume,
    ) -> Self {
        let mut rec = Self::base(time, MatchOperation::Cancel, Some(competitor), snapshot, future_price, etf_price);
        rec.order_id = Some(order_id);
        rec.volume = Some(-(volume_removed as i64));
        rec
    }

    pub fn disconnect(time: f64, competitor: String, snapshot: AccountSnapshot, future_price: Price, etf_price: Price) -> Self {
        Self::base(time, MatchOperation::Disconnect, Some(competitor), snapshot, future_price, etf_price)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn fill(
        time: f64,
        competitor: String,
        snapshot: AccountSnapshot,
        future_price: Price,
        order_id: ClientOrderId,
        side: Side,
        price: Price,
        volume: Volume,
        fee: Fee,
    ) -> Self {
        let mut rec = Self::base(time, MatchOperation::Fill, Some(competitor), snapshot, future_price, price);
        rec.order_id = Some(order_id);
        rec.side = Some(side);
        rec.volume = Some(-(volume as i64));
        rec.price = Some(price);
        rec.fee = fee;
        rec
    }

    /// The synthetic FUTURE-side leg of an auto-hedge: no real order was
    /// sent, so there is no `order_id`, the fee is zero, and `volume` is
    /// recorded positive (the hedge's own side, not a reduction).
    #[allow(clippy::too_many_arguments)]
    pub fn hedge(
        time: f64,
        competitor: String,
        snapshot: AccountSnapshot,
        future_price: Price,
        etf_fill_price: Price,
        side: Side,
        midpoint_price: Price,
        volume: Volume,
    ) -> Self {
        let mut rec = Self::base(time, MatchOperation::Hedge, Some(competitor), snapshot, future_price, etf_fill_price);
        rec.side = Some(side);
        rec.volume = Some(volume as i64);
        rec.price = Some(midpoint_price);
        rec
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        time: f64,
        competitor: String,
        snapshot: AccountSnapshot,
        future_price: Price,
        etf_price: Price,
        order_id: ClientOrderId,
        side: Side,
        price: Price,
        volume: Volume,
        lifespan: Lifespan,
    ) -> Self {
        let mut rec = Self::base(time, MatchOperation::Insert, Some(competitor), snapshot, future_price, etf_price);
        rec.order_id = Some(order_id);
        rec.side = Some(side);
        rec.volume = Some(volume as i64);
        rec.price = Some(price);
        rec.lifespan = Some(lifespan);
        rec
    }

    pub fn tick(time: f64, competitor: String, snapshot: AccountSnapshot, future_price: Price, etf_price: Price) -> Self {
        Self::base(time, MatchOperation::Tick, Some(competitor), snapshot, future_price, etf_price)
    }
}

/// Where completed [`MatchEventRecord`]s go. No implementation performs
/// file IO; `ChannelMatchEventSink` only hands records to a bounded
/// writer-thread consumer, matching the writer-thread architecture
/// without owning the CSV encoding itself.
pub trait MatchEventSink {
    fn record(&self, event: MatchEventRecord);
}

/// Hands records across to a writer thread via an unbounded
/// `crossbeam::channel`, mirroring the reader/writer thread split: the
/// main loop never blocks on IO.
pub struct ChannelMatchEventSink {
    sender: crossbeam::channel::Sender<MatchEventRecord>,
}

impl ChannelMatchEventSink {
    pub fn new(sender: crossbeam::channel::Sender<MatchEventRecord>) -> Self {
        Self { sender }
    }
}

impl MatchEventSink for ChannelMatchEventSink {
    fn record(&self, event: MatchEventRecord) {
        // The writer thread owning the receiving end outlives the match;
        // a send error here means it has already shut down, which only
        // happens during final teardown and is not actionable.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> AccountSnapshot {
        AccountSnapshot {
            balance: 0,
            future_position: 0,
            etf_position: 0,
            profit_or_loss: 0,
            total_fees: 0,
            max_drawdown: 0,
            buy_volume: 0,
            sell_volume: 0,
        }
    }

    #[test]
    fn fill_records_negative_volume() {
        let rec = MatchEventRecord::fill(1.0, "alice".into(), snapshot(), 10_000, 7, Side::Buy, 10_000, 5, 2);
        assert_eq!(rec.volume, Some(-5));
        assert_eq!(rec.fee, 2);
        assert_eq!(rec.order_id, Some(7));
    }

    #[test]
    fn hedge_has_no_order_id_and_positive_volume() {
        let rec = MatchEventRecord::hedge(1.0, "alice".into(), snapshot(), 10_000, 10_050, Side::Sell, 10_025, 5);
        assert_eq!(rec.order_id, None);
        assert_eq!(rec.fee, 0);
        assert_eq!(rec.volume, Some(5));
    }

    #[test]
    fn tick_carries_no_order_fields() {
        let rec = MatchEventRecord::tick(1.0, "alice".into(), snapshot(), 10_000, 10_000);
        assert_eq!(rec.order_id, None);
        assert_eq!(rec.side, None);
        assert_eq!(rec.lifespan, None);
    }
}
