/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Per-competitor balance, position and mark-to-market accounting.

use crate::book::round_half_to_even;
use crate::types::{Fee, Instrument, Price, Side, Volume};

/// Parameters that never change over the life of a match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountConfig {
    /// Fraction of the FUTURE price the ETF mark is allowed to deviate
    /// from before being clamped, e.g. `0.1` for 10%.
    pub etf_clamp: f64,
    pub tick_size: Price,
}

/// Tracks one competitor's cash, positions and P&L. Every fill is applied
/// via [`Account::transact`]; [`Account::mark_to_market`] recomputes
/// unrealized P&L against the current reference prices and is called on
/// every fill and every scheduler tick, regardless of whether this
/// competitor traded that tick.
#[derive(Debug, Clone, Copy)]
pub struct Account {
    config: AccountConfig,
    balance: i64,
    future_position: i64,
    etf_position: i64,
    total_fees: Fee,
    etf_buy_volume: Volume,
    etf_sell_volume: Volume,
    profit_or_loss: i64,
    max_profit: i64,
    max_drawdown: i64,
}

impl Account {
    pub fn new(config: AccountConfig) -> Self {
        Self {
            config,
            balance: 0,
            future_position: 0,
            etf_position: 0,
            total_fees: 0,
            etf_buy_volume: 0,
            etf_sell_volume: 0,
            profit_or_loss: 0,
            max_profit: 0,
            max_drawdown: 0,
        }
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn future_position(&self) -> i64 {
        self.future_position
    }

    pub fn etf_position(&self) -> i64 {
        self.etf_position
    }

    pub fn total_fees(&self) -> Fee {
        self.total_fees
    }

    pub fn etf_buy_volume(&self) -> Volume {
        self.etf_buy_volume
    }

    pub fn etf_sell_volume(&self) -> Volume {
        self.etf_sell_volume
    }

    pub fn profit_or_loss(&self) -> i64 {
        self.profit_or_loss
    }

    pub fn max_profit(&self) -> i64 {
        self.max_profit
    }

    pub fn max_drawdown(&self) -> i64 {
        self.max_drawdown
    }

    /// Applies one fill: cash moves by `price * volume` (buyer pays,
    /// seller receives), the fee is always subtracted regardless of side,
    /// and the relevant position moves by `volume`.
    pub fn transact(&mut self, instrument: Instrument, side: Side, price: Price, volume: Volume, fee: Fee) {
        let notional = price * volume as i64;
        match side {
            Side::Buy => self.balance -= notional,
            Side::Sell => self.balance += notional,
        }
        self.balance -= fee;
        self.total_fees += fee;

        let position_delta = volume as i64;
        match instrument {
            Instrument::Future => match side {
                Side::Buy => self.future_position += position_delta,
                Side::Sell => self.future_position -= position_delta,
            },
            Instrument::Etf => {
                match side {
                    Side::Buy => {
                        self.etf_position += position_delta;
                        self.etf_buy_volume += volume;
                    }
                    Side::Sell => {
                        self.etf_position -= position_delta;
                        self.etf_sell_volume += volume;
                    }
                }
            }
        }
    }

    /// Recomputes unrealized P&L. The ETF price is clamped to a band
    /// around the FUTURE price, `etf_clamp` wide and floored to a whole
    /// number of ticks, so a stale or illiquid ETF quote cannot swing
    /// reported P&L arbitrarily. `future_price`/`etf_price` of `0` are
    /// passed in verbatim by the caller when a book has not traded yet.
    pub fn mark_to_market(&mut self, future_price: Price, etf_price: Price) -> i64 {
        let mut delta = round_half_to_even(self.config.etf_clamp * future_price as f64);
        if self.config.tick_size > 0 {
            delta -= delta % self.config.tick_size;
        }
        let min_price = future_price - delta;
        let max_price = future_price + delta;
        let clamped_etf_price = etf_price.clamp(min_price, max_price);

        let pnl = self.balance
            + self.future_position * future_price
            + self.etf_position * clamped_etf_price;
        self.profit_or_loss = pnl;

        if pnl > self.max_profit {
            self.max_profit = pnl;
        }
        let drawdown = pnl - self.max_profit;
        if drawdown < self.max_drawdown {
            self.max_drawdown = drawdown;
        }
        pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AccountConfig {
        AccountConfig {
            etf_clamp: 0.1,
            tick_size: 100,
        }
    }

    #[test]
    fn buy_reduces_balance_and_increases_position() {
        let mut a = Account::new(config());
        a.transact(Instrument::Etf, Side::Buy, 10_000, 5, 2);
        assert_eq!(a.balance(), -10_000 * 5 - 2);
        assert_eq!(a.etf_position(), 5);
        assert_eq!(a.etf_buy_volume(), 5);
    }

    #[test]
    fn sell_increases_balance_and_decreases_position() {
        let mut a = Account::new(config());
        a.transact(Instrument::Etf, Side::Sell, 10_000, 5, 2);
        assert_eq!(a.balance(), 10_000 * 5 - 2);
        assert_eq!(a.etf_position(), -5);
        assert_eq!(a.etf_sell_volume(), 5);
    }

    #[test]
    fn mark_to_market_clamps_etf_price_to_band() {
        let mut a = Account::new(config());
        a.transact(Instrument::Etf, Side::Buy, 10_000, 1, 0);
        // etf quoted far above the future price; should clamp to the band.
        let pnl = a.mark_to_market(10_000, 50_000);
        // band = round(0.1 * 10_000) = 1000, floored to tick size 100 -> 1000
        // clamped etf price = 11_000, position 1 -> pnl = -10_000 + 11_000 = 1_000
        assert_eq!(pnl, 1_000);
    }

    #[test]
    fn max_drawdown_is_monotonically_non_increasing() {
        let mut a = Account::new(config());
        a.mark_to_market(10_000, 10_000);
        assert_eq!(a.max_drawdown(), 0);
        a.transact(Instrument::Future, Side::Buy, 10_000, 10, 0);
        a.mark_to_market(9_000, 9_000);
        assert!(a.max_drawdown() < 0);
        let first = a.max_drawdown();
        a.mark_to_market(9_000, 9_000);
        assert_eq!(a.max_drawdown(), first);
    }
}
