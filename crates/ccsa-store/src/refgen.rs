//! Ref generation: `YYYYMMDDThhmmssZ-<16 hex>`.

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{StoreError, StoreResult};

/// Produce a new, filename-safe ref: a second-precision UTC timestamp
/// followed by 8 cryptographically random bytes, hex-encoded.
///
/// Fails only if the RNG fails; callers surface that as an internal error
/// with no filesystem side effects attempted.
pub fn generate_ref() -> StoreResult<String> {
    let ts = Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut bytes = [0u8; 8];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| StoreError::Internal(format!("rng failure: {e}")))?;
    Ok(format!("{ts}-{}", hex::encode(bytes)))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::model::validate_ref;
    use proptest::prelude::*;

    proptest! {
        /// Repeated calls always produce a ref matching the external
        /// format, regardless of when in the test run they're generated.
        #[test]
        fn every_generated_ref_is_well_formed(_n in 0u8..32u8) {
            let r = generate_ref().unwrap();
            prop_assert!(validate_ref(&r).is_ok());
            prop_assert_eq!(r.len(), 16 + 1 + 16);
        }
    }
}
