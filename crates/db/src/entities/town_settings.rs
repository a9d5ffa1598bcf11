//! `SeaORM` Entity for town_settings table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "town_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub class_name: String,
    pub taxation_enabled: bool,
    /// `[{"from": "1000", "rate": "0.10"}, ...]`
    #[sea_orm(column_type = "JsonBinary")]
    pub tax_brackets: Json,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub basic_salary: Decimal,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
