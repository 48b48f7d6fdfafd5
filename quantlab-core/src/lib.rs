//! QuantLab Core: event-driven backtesting engine.
//!
//! This crate contains:
//! - Domain types (bars, orders, fills, symbols, FX, corporate actions)
//! - Trading calendars with exchange-local sessions
//! - Point-in-time data stores and the no-look-ahead reader
//! - Deterministic event queue, session clock and backtest driver
//! - Execution simulation with impact, capacity and cost profiles
//! - Multi-currency portfolio ledger
//! - Strategy SDK and rolling features

pub mod calendar;
pub mod data;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod portfolio;
pub mod precision;
pub mod rng;
pub mod strategy;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: shared stores and run outputs are Send + Sync, so
    /// parallel folds and trials can share them.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Order>();
        require_sync::<domain::Order>();
        require_send::<domain::RunId>();
        require_sync::<domain::RunId>();

        require_send::<data::PitDataReader>();
        require_sync::<data::PitDataReader>();
        require_send::<data::CorporateActionStore>();
        require_sync::<data::CorporateActionStore>();

        require_send::<calendar::ExchangeCalendar>();
        require_sync::<calendar::ExchangeCalendar>();
        require_send::<execution::CostProfiles>();
        require_sync::<execution::CostProfiles>();
        require_send::<execution::ExecutionSimulator>();
        require_sync::<execution::ExecutionSimulator>();

        require_send::<portfolio::Portfolio>();
        require_sync::<portfolio::Portfolio>();
        require_send::<engine::Backtest>();
        require_sync::<engine::Backtest>();
        require_send::<engine::BacktestConfig>();
        require_sync::<engine::BacktestConfig>();
        require_send::<engine::RunSummary>();
        require_sync::<engine::RunSummary>();

        require_send::<rng::SeedHierarchy>();
        require_sync::<rng::SeedHierarchy>();
    }
}
