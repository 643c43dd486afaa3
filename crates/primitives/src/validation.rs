//! Packed validation data returned by accounts and paymasters

use crate::constants::validation::SIG_VALIDATION_FAILED;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

const TIMESTAMP_MASK: u64 = (1 << 48) - 1;

/// Validation data of an account or a paymaster.
///
/// On the wire this is a single 256-bit word: `validAfter` in the top 48 bits, `validUntil` in the
/// next 48 bits and the aggregator in the low 160 bits. An aggregator of `0` means the entity
/// validated the signature itself, `1` means the signature check failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationData {
    pub aggregator: Address,
    pub valid_after: u64,
    /// `0` means no expiry
    pub valid_until: u64,
}

impl ValidationData {
    pub fn new(aggregator: Address, valid_after: u64, valid_until: u64) -> Self {
        Self {
            aggregator,
            valid_after: valid_after & TIMESTAMP_MASK,
            valid_until: valid_until & TIMESTAMP_MASK,
        }
    }

    /// Signature is valid, no time restrictions
    pub fn valid() -> Self {
        Self::default()
    }

    /// Signature check failed
    pub fn sig_failed() -> Self {
        Self { aggregator: *SIG_VALIDATION_FAILED, ..Default::default() }
    }

    /// Signature verification is deferred to the given aggregator
    pub fn aggregated(aggregator: Address) -> Self {
        Self { aggregator, ..Default::default() }
    }

    pub fn with_time_range(mut self, valid_after: u64, valid_until: u64) -> Self {
        self.valid_after = valid_after & TIMESTAMP_MASK;
        self.valid_until = valid_until & TIMESTAMP_MASK;
        self
    }

    pub fn is_sig_failed(&self) -> bool {
        self.aggregator == *SIG_VALIDATION_FAILED
    }

    /// Upper bound of the validity window with `0` mapped to "never expires"
    pub fn valid_until_or_max(&self) -> u64 {
        if self.valid_until == 0 {
            TIMESTAMP_MASK
        } else {
            self.valid_until
        }
    }

    /// Whether `now` falls outside of `[valid_after, valid_until]`
    pub fn is_out_of_time_range(&self, now: u64) -> bool {
        now > self.valid_until_or_max() || now < self.valid_after
    }

    /// Intersects the time range of the account's validation data with the paymaster's.
    ///
    /// The account's aggregator wins unless the account validated itself and the paymaster
    /// reported a failure (or an aggregator).
    pub fn intersect(&self, paymaster: &ValidationData) -> ValidationData {
        let aggregator =
            if self.aggregator.is_zero() { paymaster.aggregator } else { self.aggregator };
        ValidationData {
            aggregator,
            valid_after: self.valid_after.max(paymaster.valid_after),
            valid_until: self.valid_until_or_max().min(paymaster.valid_until_or_max()),
        }
    }

    pub fn pack(&self) -> U256 {
        U256::from_big_endian(self.aggregator.as_bytes()) |
            (U256::from(self.valid_until & TIMESTAMP_MASK) << 160) |
            (U256::from(self.valid_after & TIMESTAMP_MASK) << 208)
    }

    pub fn unpack(data: U256) -> Self {
        let mut b: [u8; 32] = [0; 32];
        data.to_big_endian(&mut b);
        let valid_after = U256::from_big_endian(&b[0..6]).low_u64();
        let valid_until = U256::from_big_endian(&b[6..12]).low_u64();
        let aggregator = Address::from_slice(&b[12..32]);
        Self { aggregator, valid_after, valid_until }
    }
}

impl From<U256> for ValidationData {
    fn from(value: U256) -> Self {
        Self::unpack(value)
    }
}

impl From<ValidationData> for U256 {
    fn from(value: ValidationData) -> Self {
        value.pack()
    }
}
