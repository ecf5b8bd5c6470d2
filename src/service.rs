//! Service layer: the lifecycle managers for requests, contracts, and payments.
//!
//! Each manager holds the shared store and runs every cross-entity mutation
//! inside a single transaction, so step resolution and request advancement,
//! or contract completion and request completion, commit together or not at
//! all.

use crate::approval::{self, ApprovalStep, StepOutcome, step_key};
use crate::contract::{Contract, ContractStatus};
use crate::error::{Error, Result};
use crate::payment::{self, Payment, PaymentStatus, PaymentSummary};
use crate::request::{Request, RequestStatus};
use crate::store::{Store, abort, txn_get, txn_put};
use crate::types::{Money, TimeStamp};
use crate::utils;
use crate::validate::{CreateContract, CreatePayment, CreateRequest, PaymentPatch, RequestPatch};
use chrono::Utc;
use sled::Transactional;
use std::sync::Arc;
use tracing::{info, warn};

/// Longest approval chain across all tiers.
const MAX_CHAIN: usize = 3;

pub struct RequestService {
    store: Arc<Store>,
}

impl RequestService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Validate input, check the value against the declared tier, persist a draft.
    pub fn create(&self, input: CreateRequest) -> Result<Request> {
        input.validate()?;
        input.tier.check(input.estimated_value)?;

        let now = TimeStamp::now();
        let row = Request {
            id: utils::new_id(utils::REQUEST_HRP)?,
            tier: input.tier,
            requester: input.requester,
            unit: input.unit,
            description: input.description,
            estimated_value: input.estimated_value,
            budget_code: input.budget_code,
            status: RequestStatus::Draft,
            current_step: 0,
            attempt: 0,
            notes: vec![],
            created_at: now,
            updated_at: now,
        };
        self.store.put_request(&row)?;

        info!(id = %row.id, tier = ?row.tier, "request created");
        Ok(row)
    }

    /// Field updates are draft-only. A new estimated value is re-checked
    /// against the declared tier before anything is written.
    pub fn update(&self, id: &str, patch: RequestPatch) -> Result<Request> {
        patch.validate()?;

        let mut row = self.store.get_request(id)?;
        if row.status != RequestStatus::Draft {
            return Err(Error::bad_status(
                "request",
                id,
                row.status.as_str(),
                "draft",
            ));
        }
        if let Some(value) = patch.estimated_value {
            row.tier.check(value)?;
            row.estimated_value = value;
        }
        if let Some(requester) = patch.requester {
            row.requester = requester;
        }
        if let Some(unit) = patch.unit {
            row.unit = unit;
        }
        if let Some(description) = patch.description {
            row.description = description;
        }
        if let Some(budget_code) = patch.budget_code {
            row.budget_code = budget_code;
        }
        row.updated_at = TimeStamp::now();
        self.store.put_request(&row)?;

        Ok(row)
    }

    /// Move a draft into the approval flow: set it pending, point at step 1,
    /// and materialize the step sequence for its tier, atomically.
    pub fn submit(&self, id: &str) -> Result<Request> {
        // Minted outside the closure: sled may re-run it on conflict. Chains
        // never exceed MAX_CHAIN roles.
        let mut step_ids = Vec::with_capacity(MAX_CHAIN);
        for _ in 0..MAX_CHAIN {
            step_ids.push(utils::new_id(utils::STEP_HRP)?);
        }

        let row = (&self.store.requests, &self.store.steps)
            .transaction(|(tr, ts)| {
                let mut request: Request = match txn_get(tr, id)? {
                    Some(row) => row,
                    None => return abort(Error::not_found("request", id)),
                };
                if let Err(e) = request.transition(RequestStatus::Pending) {
                    return abort(e);
                }
                request.attempt += 1;
                request.current_step = 1;

                let mut ids = step_ids.iter().cloned();
                let steps = approval::build_steps(&request.id, request.attempt, request.tier, || {
                    ids.next().unwrap_or_default()
                });
                for step in &steps {
                    txn_put(ts, &step_key(id, step.attempt, step.step_number), step)?;
                }
                txn_put(tr, id, &request)?;
                Ok(request)
            })
            .map_err(Error::from)?;

        info!(id, attempt = row.attempt, "request submitted");
        Ok(row)
    }

    pub fn approve(&self, id: &str, approver_id: &str, comments: Option<String>) -> Result<Request> {
        self.resolve(id, StepOutcome::Approve, approver_id, comments)
    }

    pub fn reject(&self, id: &str, approver_id: &str, reason: &str) -> Result<Request> {
        self.resolve(id, StepOutcome::Reject, approver_id, Some(reason.to_string()))
    }

    /// Resolve the single pending step of the current attempt and advance or
    /// finalize the parent request in the same transaction.
    fn resolve(
        &self,
        id: &str,
        outcome: StepOutcome,
        approver_id: &str,
        comments: Option<String>,
    ) -> Result<Request> {
        let row = (&self.store.requests, &self.store.steps)
            .transaction(|(tr, ts)| {
                let mut request: Request = match txn_get(tr, id)? {
                    Some(row) => row,
                    None => return abort(Error::not_found("request", id)),
                };
                if request.status != RequestStatus::Pending {
                    let to = match outcome {
                        StepOutcome::Approve => RequestStatus::Approved,
                        StepOutcome::Reject => RequestStatus::Rejected,
                    };
                    return abort(Error::bad_edge(
                        "request",
                        id,
                        request.status.as_str(),
                        to.as_str(),
                    ));
                }

                let chain = request.tier.approval_chain();
                let mut current: Option<(String, ApprovalStep)> = None;
                for number in 1..=chain.len() as u32 {
                    let key = step_key(id, request.attempt, number);
                    if let Some(step) = txn_get::<ApprovalStep>(ts, &key)? {
                        if step.is_pending() {
                            current = Some((key, step));
                            break;
                        }
                    }
                }
                let (key, mut step) = match current {
                    Some(found) => found,
                    None => return abort(Error::NoPendingStep { id: id.to_string() }),
                };

                step.resolve(outcome, approver_id, comments.clone());
                match outcome {
                    StepOutcome::Approve if (step.step_number as usize) < chain.len() => {
                        request.current_step += 1;
                        request.updated_at = TimeStamp::now();
                    }
                    StepOutcome::Approve => {
                        if let Err(e) = request.transition(RequestStatus::Approved) {
                            return abort(e);
                        }
                    }
                    StepOutcome::Reject => {
                        if let Err(e) = request.transition(RequestStatus::Rejected) {
                            return abort(e);
                        }
                    }
                }

                txn_put(ts, &key, &step)?;
                txn_put(tr, id, &request)?;
                Ok(request)
            })
            .map_err(Error::from)?;

        info!(id, outcome = ?outcome, status = row.status.as_str(), "approval step resolved");
        Ok(row)
    }

    /// Cancellation is a requester action and only reaches drafts and
    /// requests still in approval.
    pub fn cancel(&self, id: &str, reason: &str) -> Result<Request> {
        let mut row = self.store.get_request(id)?;
        if !matches!(row.status, RequestStatus::Draft | RequestStatus::Pending) {
            return Err(Error::bad_status(
                "request",
                id,
                row.status.as_str(),
                "draft or pending",
            ));
        }
        row.transition(RequestStatus::Cancelled)?;
        row.note(format!("cancelled: {reason}"));
        self.store.put_request(&row)?;

        info!(id, "request cancelled");
        Ok(row)
    }

    /// Reopen a rejected request for revision. The next submit starts a fresh
    /// step sequence under a new attempt number.
    pub fn resubmit(&self, id: &str) -> Result<Request> {
        let mut row = self.store.get_request(id)?;
        row.transition(RequestStatus::Draft)?;
        row.current_step = 0;
        self.store.put_request(&row)?;

        info!(id, "request reopened as draft");
        Ok(row)
    }

    /// Driven by contract completion; callable directly for requests fulfilled
    /// outside a contract.
    pub fn complete(&self, id: &str) -> Result<Request> {
        let mut row = self.store.get_request(id)?;
        row.transition(RequestStatus::Completed)?;
        self.store.put_request(&row)?;

        info!(id, "request completed");
        Ok(row)
    }

    /// Physical removal, drafts only.
    pub fn delete(&self, id: &str) -> Result<()> {
        let row = self.store.get_request(id)?;
        if row.status != RequestStatus::Draft {
            return Err(Error::bad_status(
                "request",
                id,
                row.status.as_str(),
                "draft",
            ));
        }
        self.store.remove_request(id)
    }

    pub fn get(&self, id: &str) -> Result<Request> {
        self.store.get_request(id)
    }

    pub fn list(&self) -> Result<Vec<Request>> {
        self.store.list_requests()
    }

    /// Steps of the current submission attempt, in step order.
    pub fn steps(&self, id: &str) -> Result<Vec<ApprovalStep>> {
        let row = self.store.get_request(id)?;
        self.store.steps_for_attempt(id, row.attempt)
    }

    /// Full step history across all attempts, for audit reads.
    pub fn step_history(&self, id: &str) -> Result<Vec<ApprovalStep>> {
        self.store.get_request(id)?;
        self.store.all_steps_for(id)
    }
}

pub struct ContractService {
    store: Arc<Store>,
}

impl ContractService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Contracts are only cut from approved requests with an active vendor.
    pub fn create(&self, input: CreateContract) -> Result<Contract> {
        input.validate()?;

        let request = self.store.get_request(&input.request_id)?;
        if request.status != RequestStatus::Approved {
            return Err(Error::bad_status(
                "request",
                &input.request_id,
                request.status.as_str(),
                "approved",
            ));
        }
        let vendor = self.store.get_vendor(&input.vendor_id)?;
        if !vendor.is_active {
            warn!(vendor = %vendor.id, "contract refused, vendor inactive");
            return Err(Error::VendorInactive { id: vendor.id });
        }

        let now = TimeStamp::now();
        let row = Contract {
            id: utils::new_id(utils::CONTRACT_HRP)?,
            request_id: input.request_id,
            vendor_id: input.vendor_id,
            description: input.description,
            contract_value: input.contract_value,
            start_date: input.start_date,
            end_date: input.end_date,
            status: ContractStatus::Draft,
            signed_by: None,
            signed_date: None,
            notes: vec![],
            created_at: now,
            updated_at: now,
        };
        self.store.put_contract(&row)?;

        info!(id = %row.id, request = %row.request_id, "contract created");
        Ok(row)
    }

    /// Signing activates the contract and moves the parent request into
    /// progress, atomically.
    pub fn activate(
        &self,
        id: &str,
        signed_by: &str,
        signed_date: TimeStamp<Utc>,
    ) -> Result<Contract> {
        let row = (&self.store.contracts, &self.store.requests)
            .transaction(|(tc, tr)| {
                let mut contract: Contract = match txn_get(tc, id)? {
                    Some(row) => row,
                    None => return abort(Error::not_found("contract", id)),
                };
                if let Err(e) = contract.transition(ContractStatus::Active) {
                    return abort(e);
                }
                contract.signed_by = Some(signed_by.to_string());
                contract.signed_date = Some(signed_date);

                let mut request: Request = match txn_get(tr, &contract.request_id)? {
                    Some(row) => row,
                    None => return abort(Error::not_found("request", contract.request_id.clone())),
                };
                if let Err(e) = request.transition(RequestStatus::InProgress) {
                    return abort(e);
                }

                txn_put(tr, &request.id, &request)?;
                txn_put(tc, id, &contract)?;
                Ok(contract)
            })
            .map_err(Error::from)?;

        info!(id, signed_by, "contract activated");
        Ok(row)
    }

    /// Completion requires every payment settled or cancelled, then closes the
    /// contract and the parent request in one commit.
    pub fn complete(&self, id: &str) -> Result<Contract> {
        let contract = self.store.get_contract(id)?;
        if contract.status != ContractStatus::Active {
            return Err(Error::bad_edge(
                "contract",
                id,
                contract.status.as_str(),
                ContractStatus::Completed.as_str(),
            ));
        }
        let outstanding = self
            .store
            .payments_for_contract(id)?
            .iter()
            .filter(|p| p.status.is_outstanding())
            .count();
        if outstanding > 0 {
            warn!(id, outstanding, "contract completion blocked by open payments");
            return Err(Error::PendingPayments {
                id: id.to_string(),
                outstanding,
            });
        }

        let row = (&self.store.contracts, &self.store.requests)
            .transaction(|(tc, tr)| {
                let mut contract: Contract = match txn_get(tc, id)? {
                    Some(row) => row,
                    None => return abort(Error::not_found("contract", id)),
                };
                if let Err(e) = contract.transition(ContractStatus::Completed) {
                    return abort(e);
                }
                let mut request: Request = match txn_get(tr, &contract.request_id)? {
                    Some(row) => row,
                    None => return abort(Error::not_found("request", contract.request_id.clone())),
                };
                if let Err(e) = request.transition(RequestStatus::Completed) {
                    return abort(e);
                }

                txn_put(tr, &request.id, &request)?;
                txn_put(tc, id, &contract)?;
                Ok(contract)
            })
            .map_err(Error::from)?;

        info!(id, "contract completed");
        Ok(row)
    }

    pub fn terminate(&self, id: &str, reason: &str) -> Result<Contract> {
        let mut row = self.store.get_contract(id)?;
        if row.status != ContractStatus::Active {
            return Err(Error::bad_status(
                "contract",
                id,
                row.status.as_str(),
                "active",
            ));
        }
        row.transition(ContractStatus::Terminated)?;
        row.note(format!("terminated: {reason}"));
        self.store.put_contract(&row)?;

        info!(id, "contract terminated");
        Ok(row)
    }

    /// Batch scan marking every active contract past its end date as expired.
    /// Idempotent: a second run finds nothing left to mark.
    pub fn process_expired(&self, today: TimeStamp<Utc>) -> Result<usize> {
        let mut changed = 0;
        for mut contract in self.store.list_contracts()? {
            if contract.is_expired_at(today) {
                contract.transition(ContractStatus::Expired)?;
                self.store.put_contract(&contract)?;
                info!(id = %contract.id, "contract expired");
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub fn get(&self, id: &str) -> Result<Contract> {
        self.store.get_contract(id)
    }

    pub fn list(&self) -> Result<Vec<Contract>> {
        self.store.list_contracts()
    }

    pub fn list_for_request(&self, request_id: &str) -> Result<Vec<Contract>> {
        self.store.contracts_for_request(request_id)
    }
}

pub struct PaymentService {
    store: Arc<Store>,
}

impl PaymentService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Record a payment against an active contract. The running total of
    /// non-cancelled payments is checked and advanced in the same transaction
    /// as the row insert, so the contract value can never be oversubscribed.
    pub fn create(&self, input: CreatePayment) -> Result<Payment> {
        input.validate()?;

        let contract = self.store.get_contract(&input.contract_id)?;
        if contract.status != ContractStatus::Active {
            return Err(Error::bad_status(
                "contract",
                &input.contract_id,
                contract.status.as_str(),
                "active",
            ));
        }

        let now = TimeStamp::now();
        let row = Payment {
            id: utils::new_id(utils::PAYMENT_HRP)?,
            contract_id: input.contract_id.clone(),
            amount: input.amount,
            status: PaymentStatus::Pending,
            due_date: input.due_date,
            payment_date: None,
            reference_number: None,
            description: input.description.clone(),
            notes: vec![],
            created_at: now,
            updated_at: now,
        };

        let row = (&self.store.payments, &self.store.payment_totals)
            .transaction(|(tp, tt)| {
                let total: Money = txn_get(tt, &row.contract_id)?.unwrap_or(0);
                if let Some(e) = exceeds(total, 0, row.amount, contract.contract_value) {
                    return abort(e);
                }
                txn_put(tp, &row.id, &row)?;
                txn_put(tt, &row.contract_id, &(total + row.amount))?;
                Ok(row.clone())
            })
            .map_err(|e| {
                if let sled::transaction::TransactionError::Abort(Error::PaymentExceeded {
                    excess,
                    ..
                }) = &e
                {
                    warn!(contract = %input.contract_id, excess = *excess, "payment rejected, over contract value");
                }
                Error::from(e)
            })?;

        info!(id = %row.id, contract = %row.contract_id, amount = row.amount, "payment recorded");
        Ok(row)
    }

    /// Edits stop once a payment is paid or cancelled. An amount change
    /// re-runs the running-total check with the old amount excluded.
    pub fn update(&self, id: &str, patch: PaymentPatch) -> Result<Payment> {
        patch.validate()?;

        let current = self.store.get_payment(id)?;
        if matches!(
            current.status,
            PaymentStatus::Paid | PaymentStatus::Cancelled
        ) {
            return Err(Error::bad_status(
                "payment",
                id,
                current.status.as_str(),
                "pending, processing, or failed",
            ));
        }

        if let Some(new_amount) = patch.amount {
            let contract = self.store.get_contract(&current.contract_id)?;
            let row = (&self.store.payments, &self.store.payment_totals)
                .transaction(|(tp, tt)| {
                    let mut row: Payment = match txn_get(tp, id)? {
                        Some(row) => row,
                        None => return abort(Error::not_found("payment", id)),
                    };
                    let total: Money = txn_get(tt, &row.contract_id)?.unwrap_or(0);
                    if let Some(e) =
                        exceeds(total, row.amount, new_amount, contract.contract_value)
                    {
                        return abort(e);
                    }
                    let new_total = total.saturating_sub(row.amount) + new_amount;
                    row.amount = new_amount;
                    if let Some(due_date) = patch.due_date {
                        row.due_date = due_date;
                    }
                    if let Some(description) = patch.description.clone() {
                        row.description = description;
                    }
                    row.updated_at = TimeStamp::now();

                    txn_put(tp, id, &row)?;
                    txn_put(tt, &row.contract_id, &new_total)?;
                    Ok(row)
                })
                .map_err(Error::from)?;
            return Ok(row);
        }

        let mut row = current;
        if let Some(due_date) = patch.due_date {
            row.due_date = due_date;
        }
        if let Some(description) = patch.description {
            row.description = description;
        }
        row.updated_at = TimeStamp::now();
        self.store.put_payment(&row)?;
        Ok(row)
    }

    pub fn process(&self, id: &str) -> Result<Payment> {
        let mut row = self.store.get_payment(id)?;
        row.transition(PaymentStatus::Processing)?;
        self.store.put_payment(&row)?;

        info!(id, "payment processing");
        Ok(row)
    }

    pub fn complete(
        &self,
        id: &str,
        reference_number: &str,
        payment_date: Option<TimeStamp<Utc>>,
    ) -> Result<Payment> {
        let mut row = self.store.get_payment(id)?;
        row.transition(PaymentStatus::Paid)?;
        row.reference_number = Some(reference_number.to_string());
        row.payment_date = Some(payment_date.unwrap_or_else(TimeStamp::now));
        self.store.put_payment(&row)?;

        info!(id, reference_number, "payment paid");
        Ok(row)
    }

    pub fn fail(&self, id: &str, reason: &str) -> Result<Payment> {
        let mut row = self.store.get_payment(id)?;
        row.transition(PaymentStatus::Failed)?;
        row.note(format!("failed: {reason}"));
        self.store.put_payment(&row)?;

        warn!(id, reason, "payment failed");
        Ok(row)
    }

    /// Cancelling releases the amount from the contract's running total in the
    /// same commit that parks the row.
    pub fn cancel(&self, id: &str, reason: &str) -> Result<Payment> {
        let row = (&self.store.payments, &self.store.payment_totals)
            .transaction(|(tp, tt)| {
                let mut row: Payment = match txn_get(tp, id)? {
                    Some(row) => row,
                    None => return abort(Error::not_found("payment", id)),
                };
                if let Err(e) = row.transition(PaymentStatus::Cancelled) {
                    return abort(e);
                }
                row.note(format!("cancelled: {reason}"));

                let total: Money = txn_get(tt, &row.contract_id)?.unwrap_or(0);
                txn_put(tt, &row.contract_id, &total.saturating_sub(row.amount))?;
                txn_put(tp, id, &row)?;
                Ok(row)
            })
            .map_err(Error::from)?;

        info!(id, "payment cancelled");
        Ok(row)
    }

    /// Reopen a failed payment. The follow-up process/complete calls are
    /// business actions; nothing retries automatically.
    pub fn retry(&self, id: &str) -> Result<Payment> {
        let mut row = self.store.get_payment(id)?;
        row.transition(PaymentStatus::Pending)?;
        row.note("retry requested".to_string());
        self.store.put_payment(&row)?;

        info!(id, "payment reopened for retry");
        Ok(row)
    }

    pub fn summary(&self, contract_id: &str) -> Result<PaymentSummary> {
        let contract = self.store.get_contract(contract_id)?;
        let payments = self.store.payments_for_contract(contract_id)?;
        Ok(payment::summarize(contract.contract_value, &payments))
    }

    pub fn get(&self, id: &str) -> Result<Payment> {
        self.store.get_payment(id)
    }

    pub fn list_for_contract(&self, contract_id: &str) -> Result<Vec<Payment>> {
        self.store.payments_for_contract(contract_id)
    }
}

/// Running-total guard shared by payment create and amount edits. `excluded`
/// is the edited row's old amount, zero on create.
fn exceeds(total: Money, excluded: Money, amount: Money, contract_value: Money) -> Option<Error> {
    let base = total.saturating_sub(excluded) as u128;
    let new_total = base + amount as u128;
    if new_total > contract_value as u128 {
        let excess = (new_total - contract_value as u128).min(Money::MAX as u128) as Money;
        return Some(Error::PaymentExceeded {
            amount,
            contract_value,
            excess,
        });
    }
    None
}
