//! `SeaORM` Entity for loans table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::LoanStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "loans")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub borrower: Uuid,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub amount: Decimal,
    pub term_weeks: i32,
    #[sea_orm(column_type = "Decimal(Some((6, 4)))")]
    pub interest_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub total_repayable: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub weekly_payment: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub outstanding_balance: Decimal,
    pub status: LoanStatus,
    pub next_payment_date: Option<Date>,
    pub due_date: Option<Date>,
    pub decided_by: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub approved_at: Option<DateTimeWithTimeZone>,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::Borrower",
        to = "super::accounts::Column::Id"
    )]
    Accounts,
    #[sea_orm(has_many = "super::loan_payments::Entity")]
    LoanPayments,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl Related<super::loan_payments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoanPayments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
