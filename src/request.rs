//! Procurement request row and its status graph
use crate::error::{Error, Result};
use crate::tier::Tier;
use crate::types::{Money, TimeStamp};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Pending,
    #[n(2)]
    Approved,
    #[n(3)]
    InProgress,
    #[n(4)]
    Completed,
    #[n(5)]
    Rejected,
    #[n(6)]
    Cancelled,
}

impl RequestStatus {
    /// Outgoing edges of the request status graph. Terminal states return none.
    pub fn transitions(self) -> &'static [RequestStatus] {
        use RequestStatus::*;
        match self {
            Draft => &[Pending, Cancelled],
            Pending => &[Approved, Rejected, Cancelled],
            Approved => &[InProgress, Cancelled],
            InProgress => &[Completed, Cancelled],
            Rejected => &[Draft],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition(self, to: RequestStatus) -> bool {
        self.transitions().contains(&to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Draft => "draft",
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Request {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub tier: Tier,
    #[n(2)]
    pub requester: String,
    #[n(3)]
    pub unit: String,
    #[n(4)]
    pub description: String,
    #[n(5)]
    pub estimated_value: Money,
    #[n(6)]
    pub budget_code: String,
    #[n(7)]
    pub status: RequestStatus,
    /// Number of the step currently awaiting action while `Pending`; equals
    /// the resolved-step count plus one. Zero while `Draft`.
    #[n(8)]
    pub current_step: u32,
    /// Submission attempt counter. Bumped on every submit so a resubmission
    /// after rejection gets a fresh, independently numbered step sequence.
    #[n(9)]
    pub attempt: u32,
    #[n(10)]
    pub notes: Vec<String>,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
    #[n(12)]
    pub updated_at: TimeStamp<Utc>,
}

impl Request {
    /// Apply a status edge, refusing anything absent from the graph.
    pub fn transition(&mut self, to: RequestStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(Error::bad_edge(
                "request",
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
