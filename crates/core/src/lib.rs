//! Core economy logic for Classbank.
//!
//! This crate holds the money rules with ZERO web or database dependencies.
//! Storage is reached through the traits in [`store`]; the in-memory store
//! backs the tests.
//!
//! # Modules
//!
//! - `ledger` - Atomic money movement between accounts and treasuries
//! - `loan` - Loan lifecycle and weekly settlement
//! - `payroll` - Salaries, progressive tax, and class payroll runs
//! - `earnings` - Anti-fraud gate for game earnings
//! - `store` - Repository and unit-of-work seams
//! - `settings` - Per-town economy settings

pub mod actor;
pub mod clock;
pub mod earnings;
pub mod ledger;
pub mod loan;
pub mod payroll;
pub mod settings;
pub mod store;

#[cfg(test)]
mod test_support;

pub use actor::{Actor, Role};
pub use clock::{Clock, ManualClock, SystemClock};
