//! Domain types for QuantLab

pub mod bar;
pub mod corporate_action;
pub mod fill;
pub mod fx;
pub mod ids;
pub mod order;
pub mod symbol;

pub use bar::Bar;
pub use corporate_action::CorporateAction;
pub use fill::Fill;
pub use fx::FxRate;
pub use ids::{OrderId, RunId, SymbolId};
pub use order::{Order, OrderSide, OrderState, OrderType, TimeInForce};
pub use symbol::SymbolRecord;

/// ISO currency code, e.g. `"EUR"`.
pub type Currency = String;
