//! Contract row and its status graph
use crate::error::{Error, Result};
use crate::types::{Money, TimeStamp};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Active,
    #[n(2)]
    Completed,
    #[n(3)]
    Terminated,
    #[n(4)]
    Expired,
}

impl ContractStatus {
    pub fn transitions(self) -> &'static [ContractStatus] {
        use ContractStatus::*;
        match self {
            Draft => &[Active, Terminated],
            Active => &[Completed, Terminated, Expired],
            Completed | Terminated | Expired => &[],
        }
    }

    pub fn can_transition(self, to: ContractStatus) -> bool {
        self.transitions().contains(&to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Terminated => "terminated",
            ContractStatus::Expired => "expired",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Contract {
    #[n(0)]
    pub id: String,
    /// The approved request this contract fulfils. Exactly one per contract.
    #[n(1)]
    pub request_id: String,
    #[n(2)]
    pub vendor_id: String,
    #[n(3)]
    pub description: String,
    #[n(4)]
    pub contract_value: Money,
    #[n(5)]
    pub start_date: TimeStamp<Utc>,
    #[n(6)]
    pub end_date: TimeStamp<Utc>,
    #[n(7)]
    pub status: ContractStatus,
    #[n(8)]
    pub signed_by: Option<String>,
    #[n(9)]
    pub signed_date: Option<TimeStamp<Utc>>,
    #[n(10)]
    pub notes: Vec<String>,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
    #[n(12)]
    pub updated_at: TimeStamp<Utc>,
}

impl Contract {
    pub fn transition(&mut self, to: ContractStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(Error::bad_edge(
                "contract",
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

    pub fn is_expired_at(&self, today: TimeStamp<Utc>) -> bool {
        self.status == ContractStatus::Active && self.end_date < today
    }
}
