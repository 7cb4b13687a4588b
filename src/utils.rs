//! Identifier generation

use super::error::EngineError;
use bech32::Bech32m;
use uuid7::uuid7;

/// Human readable prefix for transaction identifiers.
pub const TRANSACTION_HRP: &str = "txn";

// construct a time-ordered unique id then encode using bech32m
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, EngineError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| EngineError::Identifier(e.to_string()))?;
    let encoded = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| EngineError::Identifier(e.to_string()))?;
    Ok(encoded)
}

pub fn new_transaction_id() -> Result<String, EngineError> {
    new_uuid_to_bech32(TRANSACTION_HRP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_ids_are_prefixed_and_unique() {
        let a = new_transaction_id().unwrap();
        let b = new_transaction_id().unwrap();

        assert!(a.starts_with("txn1"));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_hrp_is_rejected() {
        assert!(matches!(
            new_uuid_to_bech32(""),
            Err(EngineError::Identifier(_))
        ));
    }
}
