//! # Matching Core
//!
//! The matching engine at the heart of a two-instrument algo-trading
//! contest exchange: a FUTURE instrument that trades purely on scripted
//! market data, and an ETF that competitors trade against each other and
//! against that same scripted liquidity. Every ETF fill is automatically
//! hedged into an equivalent FUTURE position at the FUTURE book's
//! midpoint, so a competitor's reported P&L reflects a market-neutral
//! book rather than raw directional exposure.
//!
//! ## Modules
//!
//! - [`types`] — shared scalar types (`Price`, `Volume`, `Side`, ...).
//! - [`book`] — the price-time-priority limit order book and its fee
//!   model.
//! - [`account`] — per-competitor balance, position and mark-to-market.
//! - [`competitor`] — the request-validation pipeline, auto-hedge, and
//!   soft/hard-breach error tiers.
//! - [`market_events`] — replays scripted market data into both books.
//! - [`controller`] — admission, the timer tick, and shutdown sequencing.
//! - [`limiter`] — the sliding-window message-frequency limiter.
//! - [`protocol`] — the wire framing for the execution channel.
//! - [`match_events`] — the audit trail of every order action and trade.
//! - [`config`] — match configuration shapes.
//! - [`error`] — the three error severities a competitor or the match can
//!   hit.
//!
//! ## What this crate does not do
//!
//! No socket or UDP datagram IO, no CSV parsing, and no CLI live here.
//! Those are external collaborators: an execution channel that turns
//! [`protocol`] messages into bytes on a TCP connection, an information
//! channel that broadcasts [`controller::DisseminationFrame`]s over UDP,
//! a reader that turns a market data file into [`market_events::MarketEvent`]s,
//! and a writer that turns [`match_events::MatchEventRecord`]s into a CSV
//! file. This crate models the state machine those collaborators drive.

pub mod account;
pub mod book;
pub mod competitor;
pub mod config;
pub mod controller;
pub mod error;
pub mod limiter;
pub mod market_events;
pub mod match_events;
pub mod prelude;
pub mod protocol;
pub mod types;
