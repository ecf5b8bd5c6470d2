//! Identifier minting: uuid7 encoded with bech32 per-entity prefixes

use crate::error::{Error, Result};
use bech32::Bech32m;
use uuid7::uuid7;

pub const REQUEST_HRP: &str = "req_";
pub const STEP_HRP: &str = "step_";
pub const CONTRACT_HRP: &str = "con_";
pub const PAYMENT_HRP: &str = "pay_";
pub const VENDOR_HRP: &str = "ven_";

// construct a unique entity id then encode using bech32
pub fn new_id(hrp: &str) -> Result<String> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| Error::ValidationFailed {
        field: "hrp",
        reason: e.to_string(),
    })?;
    let encode =
        bech32::encode::<Bech32m>(hrp, uuid7().as_bytes()).map_err(|e| Error::ValidationFailed {
            field: "hrp",
            reason: e.to_string(),
        })?;
    Ok(encode)
}
