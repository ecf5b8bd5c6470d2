//! Transactional persistence over sled.
//!
//! One named tree per entity table. Cross-entity mutations run through sled's
//! multi-tree transactions so partial application is never observable; the
//! `txn_get`/`txn_put`/`abort` helpers keep the encode/decode and abort
//! plumbing in one place for every manager.

use crate::approval::ApprovalStep;
use crate::contract::Contract;
use crate::error::{Error, Result};
use crate::payment::Payment;
use crate::request::Request;
use crate::types::Money;
use crate::vendor::Vendor;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::{Db, Tree};
use std::sync::Arc;

pub struct Store {
    db: Arc<Db>,
    pub(crate) requests: Tree,
    pub(crate) steps: Tree,
    pub(crate) contracts: Tree,
    pub(crate) payments: Tree,
    /// Committed running total of non-cancelled payment amounts per contract.
    /// Written in the same transaction as the payment row it accounts for, so
    /// the check-then-write against the contract value is atomic.
    pub(crate) payment_totals: Tree,
    pub(crate) vendors: Tree,
}

impl Store {
    pub fn new(db: Arc<Db>) -> Result<Self> {
        Ok(Self {
            requests: db.open_tree("requests")?,
            steps: db.open_tree("steps")?,
            contracts: db.open_tree("contracts")?,
            payments: db.open_tree("payments")?,
            payment_totals: db.open_tree("payment_totals")?,
            vendors: db.open_tree("vendors")?,
            db,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // requests

    pub fn get_request(&self, id: &str) -> Result<Request> {
        fetch(&self.requests, "request", id)
    }

    pub fn put_request(&self, row: &Request) -> Result<()> {
        put(&self.requests, &row.id, row)
    }

    pub fn remove_request(&self, id: &str) -> Result<()> {
        self.requests.remove(id.as_bytes())?;
        Ok(())
    }

    pub fn list_requests(&self) -> Result<Vec<Request>> {
        scan(&self.requests)
    }

    // approval steps, keyed `request_id/attempt/step_number`

    pub fn steps_for_attempt(&self, request_id: &str, attempt: u32) -> Result<Vec<ApprovalStep>> {
        scan_prefix(&self.steps, &format!("{request_id}/{attempt:04}/"))
    }

    pub fn all_steps_for(&self, request_id: &str) -> Result<Vec<ApprovalStep>> {
        scan_prefix(&self.steps, &format!("{request_id}/"))
    }

    // contracts

    pub fn get_contract(&self, id: &str) -> Result<Contract> {
        fetch(&self.contracts, "contract", id)
    }

    pub fn put_contract(&self, row: &Contract) -> Result<()> {
        put(&self.contracts, &row.id, row)
    }

    pub fn list_contracts(&self) -> Result<Vec<Contract>> {
        scan(&self.contracts)
    }

    pub fn contracts_for_request(&self, request_id: &str) -> Result<Vec<Contract>> {
        let mut rows: Vec<Contract> = scan(&self.contracts)?;
        rows.retain(|c| c.request_id == request_id);
        Ok(rows)
    }

    // payments

    pub fn get_payment(&self, id: &str) -> Result<Payment> {
        fetch(&self.payments, "payment", id)
    }

    pub fn put_payment(&self, row: &Payment) -> Result<()> {
        put(&self.payments, &row.id, row)
    }

    pub fn payments_for_contract(&self, contract_id: &str) -> Result<Vec<Payment>> {
        let mut rows: Vec<Payment> = scan(&self.payments)?;
        rows.retain(|p| p.contract_id == contract_id);
        Ok(rows)
    }

    pub fn committed_total(&self, contract_id: &str) -> Result<Money> {
        match self.payment_totals.get(contract_id.as_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Ok(0),
        }
    }

    // vendors (read model maintained by the external registry)

    pub fn get_vendor(&self, id: &str) -> Result<Vendor> {
        fetch(&self.vendors, "vendor", id)
    }

    pub fn upsert_vendor(&self, row: &Vendor) -> Result<()> {
        put(&self.vendors, &row.id, row)
    }
}

pub(crate) fn encode<T: minicbor::Encode<()>>(row: &T) -> Result<Vec<u8>> {
    Ok(minicbor::to_vec(row)?)
}

pub(crate) fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T> {
    Ok(minicbor::decode(bytes)?)
}

fn fetch<T: for<'b> minicbor::Decode<'b, ()>>(
    tree: &Tree,
    entity: &'static str,
    id: &str,
) -> Result<T> {
    match tree.get(id.as_bytes())? {
        Some(bytes) => decode(&bytes),
        None => Err(Error::not_found(entity, id)),
    }
}

fn put<T: minicbor::Encode<()>>(tree: &Tree, key: &str, row: &T) -> Result<()> {
    tree.insert(key.as_bytes(), encode(row)?)?;
    Ok(())
}

fn scan<T: for<'b> minicbor::Decode<'b, ()>>(tree: &Tree) -> Result<Vec<T>> {
    let mut rows = Vec::new();
    for item in tree.iter() {
        let (_, bytes) = item?;
        rows.push(decode(&bytes)?);
    }
    Ok(rows)
}

fn scan_prefix<T: for<'b> minicbor::Decode<'b, ()>>(tree: &Tree, prefix: &str) -> Result<Vec<T>> {
    let mut rows = Vec::new();
    for item in tree.scan_prefix(prefix.as_bytes()) {
        let (_, bytes) = item?;
        rows.push(decode(&bytes)?);
    }
    Ok(rows)
}

// transaction-scope helpers

pub(crate) fn abort<T>(e: Error) -> ConflictableTransactionResult<T, Error> {
    Err(ConflictableTransactionError::Abort(e))
}

pub(crate) fn txn_get<T: for<'b> minicbor::Decode<'b, ()>>(
    tree: &TransactionalTree,
    key: &str,
) -> ConflictableTransactionResult<Option<T>, Error> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => match minicbor::decode(&bytes) {
            Ok(row) => Ok(Some(row)),
            Err(e) => abort(Error::Decode(e)),
        },
        None => Ok(None),
    }
}

pub(crate) fn txn_put<T: minicbor::Encode<()>>(
    tree: &TransactionalTree,
    key: &str,
    row: &T,
) -> ConflictableTransactionResult<(), Error> {
    let bytes = match minicbor::to_vec(row) {
        Ok(bytes) => bytes,
        Err(e) => return abort(Error::Encode(e)),
    };
    tree.insert(key.as_bytes(), bytes)?;
    Ok(())
}
