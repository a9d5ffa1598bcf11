//! `SeaORM` Entity for tax_transactions table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tax_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub account_id: Uuid,
    pub payroll_run_id: Uuid,
    pub treasury_transaction_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub gross: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub tax: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub net: Decimal,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::payroll_runs::Entity",
        from = "Column::PayrollRunId",
        to = "super::payroll_runs::Column::Id"
    )]
    PayrollRuns,
}

impl Related<super::payroll_runs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PayrollRuns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
