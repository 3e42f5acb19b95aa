//! Payment Adapters
//!
//! - `http_backend`: intent reservation and proof verification over the
//!   remote data service
//! - `card`: card network intent confirmation

pub mod card;
pub mod http_backend;

pub use card::StripeCardNetwork;
pub use http_backend::HttpSettlementBackend;
