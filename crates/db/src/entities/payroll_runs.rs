//! `SeaORM` Entity for payroll_runs table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::PayrollKind;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "payroll_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub class_name: String,
    pub kind: PayrollKind,
    pub period_start: Date,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub total_gross: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub total_tax: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub total_net: Decimal,
    pub paid_count: i32,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::tax_transactions::Entity")]
    TaxTransactions,
}

impl Related<super::tax_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaxTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
