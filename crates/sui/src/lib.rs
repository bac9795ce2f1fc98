//! Sui JSON-RPC backend for zkSend links.

pub mod builder;
pub mod chain;
pub mod client;
pub mod ledger;
pub mod types;

pub use chain::{load_optional_wallet_from_env, load_wallet_from_env, parse_secret_key};
pub use client::JsonRpcClient;
pub use ledger::SuiLedger;
