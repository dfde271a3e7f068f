pub mod amount;
pub mod batch;
pub mod config;
pub mod csv;
pub mod engine;
pub mod gateway;
pub mod model;
pub mod mti;
pub mod notification;
pub mod protocol;
pub mod store;

pub use amount::Amount;
pub use engine::Engine;
pub use model::{MerchantContext, TransactionRequest, TransactionResult, TxId};
pub use mti::Mti;
