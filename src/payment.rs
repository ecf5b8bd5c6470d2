//! Payment row, its status graph, and the pure ledger summary
use crate::error::{Error, Result};
use crate::types::{Money, TimeStamp};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Processing,
    #[n(2)]
    Paid,
    #[n(3)]
    Failed,
    #[n(4)]
    Cancelled,
}

impl PaymentStatus {
    pub fn transitions(self) -> &'static [PaymentStatus] {
        use PaymentStatus::*;
        match self {
            Pending => &[Processing, Cancelled],
            Processing => &[Paid, Failed],
            Failed => &[Pending, Cancelled],
            Paid | Cancelled => &[],
        }
    }

    pub fn can_transition(self, to: PaymentStatus) -> bool {
        self.transitions().contains(&to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// Counts toward the contract's running total. Only cancelled rows drop out.
    pub fn counts_toward_total(self) -> bool {
        self != PaymentStatus::Cancelled
    }

    /// Blocks contract completion while any payment sits here.
    pub fn is_outstanding(self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Payment {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub contract_id: String,
    #[n(2)]
    pub amount: Money,
    #[n(3)]
    pub status: PaymentStatus,
    #[n(4)]
    pub due_date: TimeStamp<Utc>,
    #[n(5)]
    pub payment_date: Option<TimeStamp<Utc>>,
    #[n(6)]
    pub reference_number: Option<String>,
    #[n(7)]
    pub description: String,
    #[n(8)]
    pub notes: Vec<String>,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub updated_at: TimeStamp<Utc>,
}

impl Payment {
    pub fn transition(&mut self, to: PaymentStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(Error::bad_edge(
                "payment",
                self.id.clone(),
                self.status.as_str(),
                to.as_str(),
            ));
        }
        self.status = to;
        self.updated_at = TimeStamp::now();
        Ok(())
    }

    pub fn note(&mut self, entry: impl Into<String>) {
        self.notes.push(entry.into());
    }
}

/// Aggregate view of a contract's payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentSummary {
    pub total_paid: Money,
    pub total_pending: Money,
    pub total_processing: Money,
    pub total_failed: Money,
    /// Contract value minus the paid total, saturating at zero.
    pub remaining: Money,
    /// Rounded whole percent of the contract value already paid. Zero when
    /// the contract value is zero.
    pub percent_paid: u32,
    pub is_fully_paid: bool,
}

/// Pure aggregation over a contract's payment rows.
pub fn summarize(contract_value: Money, payments: &[Payment]) -> PaymentSummary {
    let mut total_paid: Money = 0;
    let mut total_pending: Money = 0;
    let mut total_processing: Money = 0;
    let mut total_failed: Money = 0;

    for payment in payments {
        match payment.status {
            PaymentStatus::Paid => total_paid += payment.amount,
            PaymentStatus::Pending => total_pending += payment.amount,
            PaymentStatus::Processing => total_processing += payment.amount,
            PaymentStatus::Failed => total_failed += payment.amount,
            PaymentStatus::Cancelled => {}
        }
    }

    let remaining = contract_value.saturating_sub(total_paid);
    let percent_paid = if contract_value == 0 {
        0
    } else {
        // round half-up in integer space
        ((total_paid as u128 * 100 + contract_value as u128 / 2) / contract_value as u128) as u32
    };

    PaymentSummary {
        total_paid,
        total_pending,
        total_processing,
        total_failed,
        remaining,
        percent_paid,
        is_fully_paid: contract_value > 0 && total_paid >= contract_value,
    }
}
