//! Class payroll: gross salary, progressive tax, and the weekly runs.

pub mod error;
pub mod salary;
pub mod service;
pub mod tax;
pub mod types;


pub use error::PayrollError;
pub use service::PayrollService;
pub use types::{
    Employment, PaySlip, PayrollKind, PayrollReport, PayrollRun, RosterMember, TaxTransaction,
};
