//! Tier policy: value brackets and the approval chain each bracket mandates
use crate::error::{Error, Result};
use crate::types::Money;

/// Lower bound of the T2 bracket, exclusive upper bound of T1.
pub const T2_FLOOR: Money = 10_000_000;
/// Lower bound of the T3 bracket, exclusive upper bound of T2.
pub const T3_FLOOR: Money = 50_000_000;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    #[n(0)]
    T1,
    #[n(1)]
    T2,
    #[n(2)]
    T3,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    #[n(0)]
    UnitHead,
    #[n(1)]
    Ppk,
    #[n(2)]
    Ppspm,
}

impl Tier {
    /// The tier whose bracket contains the given value.
    pub fn for_value(value: Money) -> Tier {
        if value < T2_FLOOR {
            Tier::T1
        } else if value < T3_FLOOR {
            Tier::T2
        } else {
            Tier::T3
        }
    }

    pub fn contains(self, value: Money) -> bool {
        Tier::for_value(value) == self
    }

    /// Fails with `TierMismatch` when the value falls outside this tier's bracket.
    pub fn check(self, value: Money) -> Result<()> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(Error::TierMismatch { tier: self, value })
        }
    }

    /// Ordered approver roles a request of this tier must pass through.
    pub fn approval_chain(self) -> &'static [Role] {
        match self {
            Tier::T1 => &[Role::UnitHead],
            Tier::T2 => &[Role::UnitHead, Role::Ppk],
            Tier::T3 => &[Role::UnitHead, Role::Ppk, Role::Ppspm],
        }
    }
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::UnitHead => "unit_head",
            Role::Ppk => "ppk",
            Role::Ppspm => "ppspm",
        }
    }
}
