//! Domain types for accounts, treasuries, and the transaction log.

use chrono::{DateTime, Utc};
use classbank_shared::types::{
    AccountId, PayrollRunId, TenantId, TransactionId, TreasuryId, TreasuryTransactionId, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which float a treasury row holds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TreasuryScope {
    /// A class treasury controlled by its teacher.
    Class(String),
    /// The shop counterparty receiving purchases.
    Shop,
    /// The system counterparty.
    System,
}

impl TreasuryScope {
    /// Scope of a class treasury.
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        Self::Class(name.into())
    }
}

impl std::fmt::Display for TreasuryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Class(name) => write!(f, "class:{name}"),
            Self::Shop => f.write_str("shop"),
            Self::System => f.write_str("system"),
        }
    }
}

impl std::str::FromStr for TreasuryScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shop" => Ok(Self::Shop),
            "system" => Ok(Self::System),
            other => match other.strip_prefix("class:") {
                Some(name) if !name.trim().is_empty() => Ok(Self::Class(name.to_string())),
                _ => Err(format!("invalid treasury scope: {other}")),
            },
        }
    }
}

impl TryFrom<String> for TreasuryScope {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TreasuryScope> for String {
    fn from(scope: TreasuryScope) -> Self {
        scope.to_string()
    }
}

/// Natural key of a treasury row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TreasuryKey {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Float held by the row.
    pub scope: TreasuryScope,
}

impl TreasuryKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(tenant_id: TenantId, scope: TreasuryScope) -> Self {
        Self { tenant_id, scope }
    }

    /// Key of a class treasury.
    #[must_use]
    pub fn class(tenant_id: TenantId, class_name: &str) -> Self {
        Self::new(tenant_id, TreasuryScope::class(class_name))
    }
}

/// A student bank account. The balance is signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID.
    pub id: AccountId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Holder of the account.
    pub user_id: UserId,
    /// Current balance; negative while a loan repayment is overdue.
    pub balance: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last balance change.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates an empty account.
    #[must_use]
    pub fn open(tenant_id: TenantId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            tenant_id,
            user_id,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// True once the balance is below zero; ordinary debits are blocked then.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.balance < Decimal::ZERO
    }
}

/// A treasury float. Never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    /// Treasury ID.
    pub id: TreasuryId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Float held by the row.
    pub scope: TreasuryScope,
    /// Current balance.
    pub balance: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last balance change.
    pub updated_at: DateTime<Utc>,
}

impl Treasury {
    /// Creates an empty treasury for `key`.
    #[must_use]
    pub fn empty(key: &TreasuryKey, now: DateTime<Utc>) -> Self {
        Self {
            id: TreasuryId::new(),
            tenant_id: key.tenant_id,
            scope: key.scope.clone(),
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Natural key of this row.
    #[must_use]
    pub fn key(&self) -> TreasuryKey {
        TreasuryKey::new(self.tenant_id, self.scope.clone())
    }
}

/// Category of a balance-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Money entering the economy.
    Deposit,
    /// Money leaving the economy.
    Withdrawal,
    /// Student-to-student transfer.
    Transfer,
    /// Shop purchase.
    Purchase,
    /// Fine issued by a teacher.
    Fine,
    /// Weekly job salary.
    Salary,
    /// Weekly payment to students without a job.
    BasicSalary,
    /// Reward for a validated game session.
    GameEarnings,
    /// Loan principal paid out.
    LoanDisbursement,
    /// Loan installment or manual payment.
    LoanRepayment,
    /// Tax retained during payroll.
    Tax,
}

impl TransactionKind {
    /// Returns the kind as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Transfer => "transfer",
            Self::Purchase => "purchase",
            Self::Fine => "fine",
            Self::Salary => "salary",
            Self::BasicSalary => "basic_salary",
            Self::GameEarnings => "game_earnings",
            Self::LoanDisbursement => "loan_disbursement",
            Self::LoanRepayment => "loan_repayment",
            Self::Tax => "tax",
        }
    }
}

/// Direction of a treasury movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreasuryFlow {
    /// Balance increased.
    Inflow,
    /// Balance decreased.
    Outflow,
    /// Tax kept back during payroll; balance unchanged.
    Retention,
}

/// Immutable record of a movement touching at least one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID.
    pub id: TransactionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Debited account, if any.
    pub from_account: Option<AccountId>,
    /// Credited account, if any.
    pub to_account: Option<AccountId>,
    /// Positive amount moved.
    pub amount: Decimal,
    /// Category.
    pub kind: TransactionKind,
    /// Free-text description.
    pub description: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Immutable record of a treasury movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryTransaction {
    /// Treasury transaction ID.
    pub id: TreasuryTransactionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Treasury row moved.
    pub treasury_id: TreasuryId,
    /// Scope of that treasury.
    pub scope: TreasuryScope,
    /// Direction.
    pub flow: TreasuryFlow,
    /// Positive amount.
    pub amount: Decimal,
    /// Category.
    pub kind: TransactionKind,
    /// Free-text description.
    pub description: String,
    /// Account on the other side, if exactly one.
    pub counterparty_account: Option<AccountId>,
    /// Payroll run that produced this row.
    pub payroll_run_id: Option<PayrollRunId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One side of a movement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Party {
    /// A student account.
    Account(AccountId),
    /// A treasury of the request's tenant.
    Treasury(TreasuryScope),
}

impl Party {
    /// Account ID, for account parties.
    #[must_use]
    pub const fn account_id(&self) -> Option<AccountId> {
        match self {
            Self::Account(id) => Some(*id),
            Self::Treasury(_) => None,
        }
    }
}

/// How strictly a debit from an account is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebitPolicy {
    /// Account must not be negative and must cover the amount.
    #[default]
    Ordinary,
    /// Skips the cover check and may push the balance negative. A negative
    /// account is still frozen. Loan settlement only.
    Overdraft,
}

/// Shape of a movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Movement {
    /// Take money out of one party.
    Debit {
        /// Debited party.
        from: Party,
        /// Account check policy.
        policy: DebitPolicy,
    },
    /// Put money into one party.
    Credit {
        /// Credited party.
        to: Party,
    },
    /// Move money between two parties.
    Transfer {
        /// Debited party.
        from: Party,
        /// Credited party.
        to: Party,
        /// Account check policy for the debit side.
        policy: DebitPolicy,
    },
}

impl Movement {
    /// Debited party, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Party> {
        match self {
            Self::Debit { from, .. } | Self::Transfer { from, .. } => Some(from),
            Self::Credit { .. } => None,
        }
    }

    /// Credited party, if any.
    #[must_use]
    pub fn destination(&self) -> Option<&Party> {
        match self {
            Self::Credit { to } | Self::Transfer { to, .. } => Some(to),
            Self::Debit { .. } => None,
        }
    }

    /// Debit policy; credits have none and report `Ordinary`.
    #[must_use]
    pub fn policy(&self) -> DebitPolicy {
        match self {
            Self::Debit { policy, .. } | Self::Transfer { policy, .. } => *policy,
            Self::Credit { .. } => DebitPolicy::Ordinary,
        }
    }
}

/// Input to `LedgerEngine::apply`.
#[derive(Debug, Clone)]
pub struct MovementRequest {
    /// Tenant every party belongs to.
    pub tenant_id: TenantId,
    /// What moves where.
    pub movement: Movement,
    /// Positive amount with at most two decimal places.
    pub amount: Decimal,
    /// Category recorded on the log rows.
    pub kind: TransactionKind,
    /// Description recorded on the log rows.
    pub description: String,
}

/// Rows written by one movement.
#[derive(Debug, Clone)]
pub struct MovementReceipt {
    /// Account-side log row, present when an account was touched.
    pub transaction: Option<Transaction>,
    /// One row per treasury leg.
    pub treasury_transactions: Vec<TreasuryTransaction>,
    /// Balance of the debited party after the movement.
    pub source_balance: Option<Decimal>,
    /// Balance of the credited party after the movement.
    pub destination_balance: Option<Decimal>,
}

/// One credit inside a disbursement batch.
#[derive(Debug, Clone)]
pub struct Disbursement {
    /// Credited account.
    pub account_id: AccountId,
    /// Positive amount.
    pub amount: Decimal,
    /// Description for that account's transaction.
    pub description: String,
}

/// Debit one treasury once and credit many accounts.
#[derive(Debug, Clone)]
pub struct DisburseRequest {
    /// Tenant of the treasury and all accounts.
    pub tenant_id: TenantId,
    /// Paying treasury.
    pub scope: TreasuryScope,
    /// Category of every row.
    pub kind: TransactionKind,
    /// Description of the treasury outflow.
    pub description: String,
    /// Credits; account IDs must be distinct.
    pub credits: Vec<Disbursement>,
    /// Payroll run the batch belongs to.
    pub payroll_run_id: Option<PayrollRunId>,
}

/// Rows written by a disbursement.
#[derive(Debug, Clone)]
pub struct DisburseReceipt {
    /// One per credited account, in ascending account order.
    pub transactions: Vec<Transaction>,
    /// The aggregate outflow.
    pub treasury_transaction: TreasuryTransaction,
    /// Treasury balance after the batch.
    pub treasury_balance: Decimal,
}
