#![allow(unused_imports)]

use anyhow::Context;
use std::sync::Arc;

use procure_lifecycle::{
    approval::StepAction,
    contract::ContractStatus,
    error::Error,
    payment::PaymentStatus,
    request::RequestStatus,
    service::{ContractService, PaymentService, RequestService},
    store::Store,
    tier::{Role, Tier},
    types::TimeStamp,
    validate::{CreateContract, CreatePayment, CreateRequest, RequestPatch},
    vendor::Vendor,
};

use tempfile::tempdir; // Use for test db cleanup.

struct Services {
    store: Arc<Store>,
    requests: RequestService,
    contracts: ContractService,
    payments: PaymentService,
}

// Sled uses file-based locking to prevent concurrent access, so each test
// opens its own database under a tempdir for simplified cleanup.
fn open_services(dir: &tempfile::TempDir, name: &str) -> anyhow::Result<Services> {
    let db = sled::open(dir.path().join(name))?;
    let store = Arc::new(Store::new(Arc::new(db))?);

    Ok(Services {
        requests: RequestService::new(store.clone()),
        contracts: ContractService::new(store.clone()),
        payments: PaymentService::new(store.clone()),
        store,
    })
}

fn seed_vendor(store: &Store, id: &str, is_active: bool) -> anyhow::Result<()> {
    store.upsert_vendor(&Vendor {
        id: id.into(),
        name: "Acme Supply".into(),
        is_active,
        performance_rating: 4.2,
    })?;
    Ok(())
}

fn tier1_request() -> CreateRequest {
    CreateRequest {
        tier: Tier::T1,
        requester: "u1".into(),
        unit: "finance".into(),
        description: "office printers".into(),
        estimated_value: 9_999_999,
        budget_code: "BC-2025-01".into(),
    }
}

/// An approved tier-1 request with an active contract, ready for payments.
fn approved_contract(svc: &Services) -> anyhow::Result<(String, String)> {
    seed_vendor(&svc.store, "ven_acme", true)?;

    let request = svc.requests.create(tier1_request())?;
    svc.requests.submit(&request.id)?;
    svc.requests
        .approve(&request.id, "u1", None)
        .context("tier-1 chain should finish on the first approval")?;

    let contract = svc.contracts.create(CreateContract {
        request_id: request.id.clone(),
        vendor_id: "ven_acme".into(),
        description: "printer supply contract".into(),
        contract_value: 9_999_999,
        start_date: TimeStamp::from_date(2025, 1, 1),
        end_date: TimeStamp::from_date(2025, 6, 1),
    })?;
    svc.contracts
        .activate(&contract.id, "budi", TimeStamp::from_date(2025, 1, 2))?;

    Ok((request.id, contract.id))
}

#[test]
fn tier1_draft_submit_approve() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let svc = open_services(&temp_dir, "tier1_flow.db")?;

    let request = svc
        .requests
        .create(tier1_request())
        .context("Request failed on create: ")?;
    assert_eq!(request.status, RequestStatus::Draft);
    assert_eq!(request.current_step, 0);

    let request = svc
        .requests
        .submit(&request.id)
        .context("Request failed on submit: ")?;
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.current_step, 1);

    let steps = svc.requests.steps(&request.id)?;
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].step_number, 1);
    assert_eq!(steps[0].approver_role, Role::UnitHead);
    assert_eq!(steps[0].action, StepAction::Pending);

    let request = svc
        .requests
        .approve(&request.id, "u1", Some("approved".into()))
        .context("Request failed on approve: ")?;
    assert_eq!(request.status, RequestStatus::Approved);

    let steps = svc.requests.steps(&request.id)?;
    assert_eq!(steps[0].action, StepAction::Approve);
    assert_eq!(steps[0].approver_id.as_deref(), Some("u1"));

    Ok(())
}

#[test]
fn tier3_walks_the_full_chain() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let svc = open_services(&temp_dir, "tier3_chain.db")?;

    let request = svc.requests.create(CreateRequest {
        tier: Tier::T3,
        estimated_value: 75_000_000,
        ..tier1_request()
    })?;
    let request = svc.requests.submit(&request.id)?;
    assert_eq!(svc.requests.steps(&request.id)?.len(), 3);

    let request = svc.requests.approve(&request.id, "head1", None)?;
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.current_step, 2);

    let request = svc.requests.approve(&request.id, "ppk1", None)?;
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.current_step, 3);

    let request = svc.requests.approve(&request.id, "ppspm1", None)?;
    assert_eq!(request.status, RequestStatus::Approved);

    // the chain is spent; another approval has no pending step to land on
    let err = svc.requests.approve(&request.id, "head1", None).unwrap_err();
    assert!(matches!(err, Error::InvalidStatusTransition { .. }));

    Ok(())
}

#[test]
fn rejection_reopens_with_a_fresh_step_sequence() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let svc = open_services(&temp_dir, "rejection_cycle.db")?;

    let request = svc.requests.create(CreateRequest {
        tier: Tier::T2,
        estimated_value: 25_000_000,
        ..tier1_request()
    })?;
    let request = svc.requests.submit(&request.id)?;

    let request = svc.requests.approve(&request.id, "head1", None)?;
    assert_eq!(request.current_step, 2);

    let request = svc.requests.reject(&request.id, "ppk1", "budget code mismatch")?;
    assert_eq!(request.status, RequestStatus::Rejected);

    let request = svc.requests.resubmit(&request.id)?;
    assert_eq!(request.status, RequestStatus::Draft);
    assert_eq!(request.current_step, 0);

    let request = svc.requests.submit(&request.id)?;
    assert_eq!(request.attempt, 2);

    // fresh sequence: both steps pending again, numbered from one
    let steps = svc.requests.steps(&request.id)?;
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.action == StepAction::Pending));
    assert_eq!(steps[0].step_number, 1);

    // the first attempt's resolved steps survive for audit
    let history = svc.requests.step_history(&request.id)?;
    assert_eq!(history.len(), 4);

    Ok(())
}

#[test]
fn contract_requires_approved_request_active_vendor_ordered_dates() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let svc = open_services(&temp_dir, "contract_gates.db")?;
    seed_vendor(&svc.store, "ven_acme", true)?;
    seed_vendor(&svc.store, "ven_idle", false)?;

    let request = svc.requests.create(tier1_request())?;

    let input = CreateContract {
        request_id: request.id.clone(),
        vendor_id: "ven_acme".into(),
        description: "printer supply contract".into(),
        contract_value: 9_999_999,
        start_date: TimeStamp::from_date(2025, 1, 1),
        end_date: TimeStamp::from_date(2025, 6, 1),
    };

    // request is still draft
    let err = svc.contracts.create(input.clone()).unwrap_err();
    assert!(matches!(err, Error::InvalidStatus { required: "approved", .. }));

    svc.requests.submit(&request.id)?;
    svc.requests.approve(&request.id, "u1", None)?;

    // inactive vendor
    let err = svc
        .contracts
        .create(CreateContract {
            vendor_id: "ven_idle".into(),
            ..input.clone()
        })
        .unwrap_err();
    assert!(matches!(err, Error::VendorInactive { .. }));

    // end date not after start date
    let err = svc
        .contracts
        .create(CreateContract {
            end_date: TimeStamp::from_date(2025, 1, 1),
            ..input.clone()
        })
        .unwrap_err();
    assert!(matches!(err, Error::ValidationFailed { field: "end_date", .. }));

    let contract = svc.contracts.create(input)?;
    assert_eq!(contract.status, ContractStatus::Draft);

    // activation signs the contract and starts work on the request
    let contract = svc
        .contracts
        .activate(&contract.id, "budi", TimeStamp::from_date(2025, 1, 2))?;
    assert_eq!(contract.status, ContractStatus::Active);
    assert_eq!(contract.signed_by.as_deref(), Some("budi"));
    assert_eq!(
        svc.requests.get(&request.id)?.status,
        RequestStatus::InProgress
    );

    Ok(())
}

#[test]
fn payment_fills_contract_exactly_then_overflows_by_one() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let svc = open_services(&temp_dir, "payment_bounds.db")?;
    let (_request_id, contract_id) = approved_contract(&svc)?;

    let payment = svc.payments.create(CreatePayment {
        contract_id: contract_id.clone(),
        amount: 9_999_999,
        due_date: TimeStamp::from_date(2025, 3, 1),
        description: "full settlement".into(),
    })?;
    assert_eq!(payment.status, PaymentStatus::Pending);

    svc.payments.process(&payment.id)?;
    let payment = svc
        .payments
        .complete(&payment.id, "TRX-001", Some(TimeStamp::from_date(2025, 3, 2)))?;
    assert_eq!(payment.status, PaymentStatus::Paid);

    let summary = svc.payments.summary(&contract_id)?;
    assert_eq!(summary.remaining, 0);
    assert_eq!(summary.percent_paid, 100);
    assert!(summary.is_fully_paid);

    // one unit over the committed value
    let err = svc
        .payments
        .create(CreatePayment {
            contract_id: contract_id.clone(),
            amount: 1,
            due_date: TimeStamp::from_date(2025, 3, 1),
            description: "overrun".into(),
        })
        .unwrap_err();
    match err {
        Error::PaymentExceeded { excess, .. } => assert_eq!(excess, 1),
        other => panic!("expected PaymentExceeded, got {other:?}"),
    }

    Ok(())
}

#[test]
fn pending_payment_blocks_contract_completion() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let svc = open_services(&temp_dir, "completion_gate.db")?;
    let (request_id, contract_id) = approved_contract(&svc)?;

    let payment = svc.payments.create(CreatePayment {
        contract_id: contract_id.clone(),
        amount: 1_000_000,
        due_date: TimeStamp::from_date(2025, 3, 1),
        description: "first installment".into(),
    })?;

    let err = svc.contracts.complete(&contract_id).unwrap_err();
    assert!(matches!(err, Error::PendingPayments { outstanding: 1, .. }));

    svc.payments.cancel(&payment.id, "installment dropped")?;

    let contract = svc.contracts.complete(&contract_id)?;
    assert_eq!(contract.status, ContractStatus::Completed);
    assert_eq!(
        svc.requests.get(&request_id)?.status,
        RequestStatus::Completed
    );

    Ok(())
}

#[test]
fn cancelled_payment_releases_its_amount() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let svc = open_services(&temp_dir, "cancel_release.db")?;
    let (_request_id, contract_id) = approved_contract(&svc)?;

    let first = svc.payments.create(CreatePayment {
        contract_id: contract_id.clone(),
        amount: 9_999_999,
        due_date: TimeStamp::from_date(2025, 3, 1),
        description: "full settlement".into(),
    })?;

    // contract fully committed, nothing more fits
    assert!(svc
        .payments
        .create(CreatePayment {
            contract_id: contract_id.clone(),
            amount: 1,
            due_date: TimeStamp::from_date(2025, 3, 1),
            description: "overrun".into(),
        })
        .is_err());

    svc.payments.cancel(&first.id, "re-planned")?;

    // the cancelled amount no longer counts toward the running total
    let second = svc.payments.create(CreatePayment {
        contract_id: contract_id.clone(),
        amount: 9_999_999,
        due_date: TimeStamp::from_date(2025, 4, 1),
        description: "re-planned settlement".into(),
    })?;
    assert_eq!(second.status, PaymentStatus::Pending);

    Ok(())
}

#[test]
fn failed_payment_retries_as_a_business_action() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let svc = open_services(&temp_dir, "retry_flow.db")?;
    let (_request_id, contract_id) = approved_contract(&svc)?;

    let payment = svc.payments.create(CreatePayment {
        contract_id,
        amount: 2_000_000,
        due_date: TimeStamp::from_date(2025, 3, 1),
        description: "installment".into(),
    })?;

    svc.payments.process(&payment.id)?;
    let payment = svc.payments.fail(&payment.id, "bank rejected account")?;
    assert_eq!(payment.status, PaymentStatus::Failed);

    let payment = svc.payments.retry(&payment.id)?;
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.notes.iter().any(|n| n.contains("retry")));

    // a paid row is immutable afterwards
    svc.payments.process(&payment.id)?;
    let payment = svc.payments.complete(&payment.id, "TRX-002", None)?;
    let err = svc
        .payments
        .update(&payment.id, Default::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidStatus { .. }));

    Ok(())
}

#[test]
fn expiry_sweep_is_idempotent() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let svc = open_services(&temp_dir, "expiry_sweep.db")?;
    let (_request_id, contract_id) = approved_contract(&svc)?;

    let today = TimeStamp::from_date(2025, 7, 1); // past the 2025-06-01 end date
    assert_eq!(svc.contracts.process_expired(today)?, 1);
    assert_eq!(
        svc.contracts.get(&contract_id)?.status,
        ContractStatus::Expired
    );

    // second run finds nothing left to mark
    assert_eq!(svc.contracts.process_expired(today)?, 0);

    Ok(())
}

#[test]
fn draft_lifecycle_update_cancel_delete() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let svc = open_services(&temp_dir, "draft_lifecycle.db")?;

    let request = svc.requests.create(tier1_request())?;

    // a value outside the declared tier is refused
    let err = svc
        .requests
        .update(
            &request.id,
            RequestPatch {
                estimated_value: Some(10_000_000),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::TierMismatch { tier: Tier::T1, .. }));

    let request = svc.requests.update(
        &request.id,
        RequestPatch {
            estimated_value: Some(5_000_000),
            description: Some("office printers, revised".into()),
            ..Default::default()
        },
    )?;
    assert_eq!(request.estimated_value, 5_000_000);

    let other = svc.requests.create(tier1_request())?;
    svc.requests.delete(&other.id)?;
    assert!(matches!(
        svc.requests.get(&other.id),
        Err(Error::NotFound { .. })
    ));

    let request = svc.requests.cancel(&request.id, "no longer needed")?;
    assert_eq!(request.status, RequestStatus::Cancelled);

    // cancelled is terminal: no further edges, no deletion
    assert!(svc.requests.submit(&request.id).is_err());
    assert!(svc.requests.delete(&request.id).is_err());

    Ok(())
}

#[test]
fn tier_mismatch_is_caught_at_create() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let svc = open_services(&temp_dir, "tier_gate.db")?;

    let err = svc
        .requests
        .create(CreateRequest {
            tier: Tier::T1,
            estimated_value: 10_000_000,
            ..tier1_request()
        })
        .unwrap_err();
    assert!(matches!(err, Error::TierMismatch { tier: Tier::T1, .. }));

    Ok(())
}
