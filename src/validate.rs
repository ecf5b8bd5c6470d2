//! Input records and their pure validation checks. Every manager runs these
//! before touching persistence; nothing here reads or writes rows.
use crate::error::{Error, Result};
use crate::tier::Tier;
use crate::types::{Money, TimeStamp};
use chrono::Utc;

fn required(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::ValidationFailed {
            field,
            reason: "must not be empty".into(),
        });
    }
    Ok(())
}

fn positive(field: &'static str, amount: Money) -> Result<()> {
    if amount == 0 {
        return Err(Error::ValidationFailed {
            field,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub tier: Tier,
    pub requester: String,
    pub unit: String,
    pub description: String,
    pub estimated_value: Money,
    pub budget_code: String,
}

impl CreateRequest {
    pub fn validate(&self) -> Result<()> {
        required("requester", &self.requester)?;
        required("unit", &self.unit)?;
        required("description", &self.description)?;
        required("budget_code", &self.budget_code)?;
        positive("estimated_value", self.estimated_value)?;
        Ok(())
    }
}

/// Field-level patch for a draft request. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct RequestPatch {
    pub requester: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub estimated_value: Option<Money>,
    pub budget_code: Option<String>,
}

impl RequestPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(requester) = &self.requester {
            required("requester", requester)?;
        }
        if let Some(unit) = &self.unit {
            required("unit", unit)?;
        }
        if let Some(description) = &self.description {
            required("description", description)?;
        }
        if let Some(budget_code) = &self.budget_code {
            required("budget_code", budget_code)?;
        }
        if let Some(value) = self.estimated_value {
            positive("estimated_value", value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CreateContract {
    pub request_id: String,
    pub vendor_id: String,
    pub description: String,
    pub contract_value: Money,
    pub start_date: TimeStamp<Utc>,
    pub end_date: TimeStamp<Utc>,
}

impl CreateContract {
    pub fn validate(&self) -> Result<()> {
        required("request_id", &self.request_id)?;
        required("vendor_id", &self.vendor_id)?;
        required("description", &self.description)?;
        positive("contract_value", self.contract_value)?;
        if self.end_date <= self.start_date {
            return Err(Error::ValidationFailed {
                field: "end_date",
                reason: "must be after start_date".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub contract_id: String,
    pub amount: Money,
    pub due_date: TimeStamp<Utc>,
    pub description: String,
}

impl CreatePayment {
    pub fn validate(&self) -> Result<()> {
        required("contract_id", &self.contract_id)?;
        required("description", &self.description)?;
        positive("amount", self.amount)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaymentPatch {
    pub amount: Option<Money>,
    pub due_date: Option<TimeStamp<Utc>>,
    pub description: Option<String>,
}

impl PaymentPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(amount) = self.amount {
            positive("amount", amount)?;
        }
        if let Some(description) = &self.description {
            required("description", description)?;
        }
        Ok(())
    }
}
