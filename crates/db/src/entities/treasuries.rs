//! `SeaORM` Entity for treasuries table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "treasuries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// `class:<name>`, `shop` or `system`.
    pub scope: String,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub balance: Decimal,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::treasury_transactions::Entity")]
    TreasuryTransactions,
}

impl Related<super::treasury_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TreasuryTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
