//! Money movement between accounts and treasuries.
//!
//! - Domain types for accounts, treasuries, and the transaction log
//! - The ledger engine applying movements atomically
//! - Account-level operations (transfers, purchases, fines, deposits)
//! - Error types for ledger operations

pub mod engine;
pub mod error;
pub mod service;
pub mod types;

#[cfg(test)]
mod engine_props;

pub use engine::{LedgerEngine, validate_amount};
pub use error::LedgerError;
pub use service::AccountService;
pub use types::{
    Account, DebitPolicy, DisburseReceipt, DisburseRequest, Disbursement, Movement,
    MovementReceipt, MovementRequest, Party, Transaction, TransactionKind, Treasury, TreasuryFlow,
    TreasuryKey, TreasuryScope, TreasuryTransaction,
};
