//! Record id generation

use super::error::{LifecycleError, Result};
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique record id then encode using bech32
pub fn new_record_id(hrp: &str) -> Result<String> {
    let invalid = || LifecycleError::InvalidPrefix(hrp.to_string());
    let parsed = bech32::Hrp::parse(hrp).map_err(|_| invalid())?;
    bech32::encode::<Bech32m>(parsed, uuid7().as_bytes()).map_err(|_| invalid())
}

/// Id of the single record of kind `hrp` that `owner_id` may own.
///
/// Reuses the owner's payload under the new prefix, so every writer of a
/// one-per-owner record lands on the same key.
pub fn owned_record_id(hrp: &str, owner_id: &str) -> Result<String> {
    let (_, payload) = bech32::decode(owner_id)
        .map_err(|_| LifecycleError::InvalidRecordId(owner_id.to_string()))?;
    let parsed = bech32::Hrp::parse(hrp)
        .map_err(|_| LifecycleError::InvalidPrefix(hrp.to_string()))?;
    bech32::encode::<Bech32m>(parsed, &payload)
        .map_err(|_| LifecycleError::InvalidPrefix(hrp.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_prefixed_ids() {
        let id = new_record_id("qtn_").unwrap();
        assert!(id.starts_with("qtn_1"));
        assert_ne!(id, new_record_id("qtn_").unwrap());
    }

    #[test]
    fn owned_ids_follow_the_owner() {
        let contract = new_record_id("ctr_").unwrap();
        let other = new_record_id("ctr_").unwrap();

        let summary = owned_record_id("wsum_", &contract).unwrap();
        assert!(summary.starts_with("wsum_1"));
        assert_eq!(summary, owned_record_id("wsum_", &contract).unwrap());
        assert_ne!(summary, owned_record_id("wsum_", &other).unwrap());
        assert_ne!(summary, owned_record_id("arch_", &contract).unwrap());
    }

    #[test]
    fn owned_ids_need_a_bech32_owner() {
        assert!(matches!(
            owned_record_id("wsum_", "ctr_missing"),
            Err(LifecycleError::InvalidRecordId(_))
        ));
    }

    #[test]
    fn rejects_empty_prefix() {
        assert!(matches!(
            new_record_id(""),
            Err(LifecycleError::InvalidPrefix(_))
        ));
    }
}
