//! `SeaORM` entities for the economy tables.

pub mod accounts;
pub mod class_members;
pub mod game_sessions;
pub mod loan_payments;
pub mod loans;
pub mod payroll_runs;
pub mod sea_orm_active_enums;
pub mod tax_transactions;
pub mod town_settings;
pub mod transactions;
pub mod treasuries;
pub mod treasury_transactions;
