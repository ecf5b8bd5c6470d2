//! Procurement request lifecycle engine: tier-routed approvals, contracting,
//! and payment settlement over a transactional store.

pub mod approval;
pub mod contract;
pub mod error;
pub mod payment;
pub mod request;
pub mod service;
pub mod store;
pub mod tier;
pub mod types;
pub mod utils;
pub mod validate;
pub mod vendor;
