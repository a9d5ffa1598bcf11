//! Repository implementations for data access.
//!
//! [`PgStore`] implements every storage seam of the core crate over one
//! connection pool; [`PgSettings`] reads per-class town settings.

pub mod convert;
pub mod settings;
pub mod store;
pub mod unit;

pub use settings::PgSettings;
pub use store::{DEFAULT_LOCK_TIMEOUT, PgStore};
pub use unit::PgUnit;
