//! Common types used across the application.

pub mod id;
pub mod money;
pub mod pagination;

pub use id::*;
pub use money::{
    CENT, MAX_MONEY, Money, ceil_money, is_settled, is_whole_cents, round_money,
    within_money_range,
};
pub use pagination::{PageMeta, PageRequest, PageResponse};
