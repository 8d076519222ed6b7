//! Account identity
//!
//! Everything that owns or moves funds on the ledger (agents, contracts,
//! tokens) is addressed through [`Identity`], so call sites take `&dyn
//! Identity` or `&impl Identity` and resolve the address once at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger account address, normalised to lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Mint/burn sentinel used by transfer events
    pub const ZERO: &'static str = "0x0000000000000000000000000000000000000000";

    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into().to_ascii_lowercase())
    }

    pub fn zero() -> Self {
        Self(Self::ZERO.to_string())
    }

    /// Deterministic 20-byte address derived from a counter
    ///
    /// # Example
    /// ```
    /// use options_sim_core::Address;
    ///
    /// assert_eq!(
    ///     Address::from_index(0xab).as_str(),
    ///     "0x00000000000000000000000000000000000000ab"
    /// );
    /// ```
    pub fn from_index(index: u64) -> Self {
        Self(format!("0x{index:040x}"))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Self::ZERO
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Address::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anything with a ledger address
pub trait Identity {
    fn address(&self) -> &Address;
}

impl Identity for Address {
    fn address(&self) -> &Address {
        self
    }
}

impl<T: Identity + ?Sized> Identity for &T {
    fn address(&self) -> &Address {
        (**self).address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_are_case_insensitive() {
        assert_eq!(Address::new("0xABcd"), Address::new("0xabcd"));
    }

    #[test]
    fn test_zero_sentinel() {
        assert!(Address::zero().is_zero());
        assert!(Address::from_index(0).is_zero());
        assert!(!Address::from_index(1).is_zero());
    }
}
