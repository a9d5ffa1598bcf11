//! `SeaORM` Entity for treasury_transactions table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{TransactionKind, TreasuryFlow};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "treasury_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub treasury_id: Uuid,
    pub scope: String,
    pub flow: TreasuryFlow,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
    pub counterparty_account: Option<Uuid>,
    pub payroll_run_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::treasuries::Entity",
        from = "Column::TreasuryId",
        to = "super::treasuries::Column::Id"
    )]
    Treasuries,
    #[sea_orm(
        belongs_to = "super::payroll_runs::Entity",
        from = "Column::PayrollRunId",
        to = "super::payroll_runs::Column::Id"
    )]
    PayrollRuns,
}

impl Related<super::treasuries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Treasuries.def()
    }
}

impl Related<super::payroll_runs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PayrollRuns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
