//! Package addresses
//!
//! Addresses are 20 raw bytes, displayed as bech32 with a configured
//! human-readable prefix. Package addresses derive deterministically from
//! the package path preimage, so the same path funds the same account on
//! every chain that embeds the runtime.

use bech32::{Bech32, Hrp};
use sha2::{Digest, Sha256};
use tern_core::errors::RuntimeError;

pub const ADDRESS_SIZE: usize = 20;

/// A 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

/// Deterministic address for a package path, from the preimage
/// `"pkgPath:" + pkg_path`. Must not collide with public-key addresses,
/// which hash a different preimage shape.
pub fn derive_pkg_addr(pkg_path: &str) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"pkgPath:");
    hasher.update(pkg_path.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; ADDRESS_SIZE];
    out.copy_from_slice(&digest[..ADDRESS_SIZE]);
    Address(out)
}

/// Bech32 display form of an address.
pub fn encode_bech32(prefix: &str, addr: &Address) -> Result<String, RuntimeError> {
    let hrp = Hrp::parse(prefix).map_err(|e| {
        RuntimeError::static_type(format!("invalid bech32 prefix {:?}: {}", prefix, e))
    })?;
    bech32::encode::<Bech32>(hrp, &addr.0)
        .map_err(|e| RuntimeError::static_type(format!("bech32 encoding failed: {}", e)))
}

/// Decode a bech32 address. Any failure, including a decoded byte length
/// other than 20, yields `ok = false` with zero-valued outputs.
pub fn decode_bech32(addr: &str) -> (String, [u8; ADDRESS_SIZE], bool) {
    match bech32::decode(addr) {
        Ok((hrp, bytes)) if bytes.len() == ADDRESS_SIZE => {
            let mut out = [0u8; ADDRESS_SIZE];
            out.copy_from_slice(&bytes);
            (hrp.to_string(), out, true)
        }
        _ => (String::new(), [0u8; ADDRESS_SIZE], false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic_and_distinct() {
        let a = derive_pkg_addr("tern.land/r/demo/stake");
        let b = derive_pkg_addr("tern.land/r/demo/stake");
        let c = derive_pkg_addr("tern.land/r/demo/votes");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_bytes().len(), ADDRESS_SIZE);
    }

    #[test]
    fn test_bech32_round_trip() {
        let addr = derive_pkg_addr("tern.land/r/demo/stake");
        let encoded = encode_bech32("tern", &addr).unwrap();
        assert!(encoded.starts_with("tern1"));
        let (prefix, bytes, ok) = decode_bech32(&encoded);
        assert!(ok);
        assert_eq!(prefix, "tern");
        assert_eq!(bytes, addr.0);
    }

    #[test]
    fn test_decode_garbage_fails_closed() {
        let (prefix, bytes, ok) = decode_bech32("not-an-address");
        assert!(!ok);
        assert!(prefix.is_empty());
        assert_eq!(bytes, [0u8; ADDRESS_SIZE]);
    }

    #[test]
    fn test_decode_wrong_length_fails_closed() {
        // valid bech32, but a 4-byte payload
        let hrp = Hrp::parse("tern").unwrap();
        let short = bech32::encode::<Bech32>(hrp, &[1, 2, 3, 4]).unwrap();
        let (_, _, ok) = decode_bech32(&short);
        assert!(!ok);
    }

    #[test]
    fn test_bad_prefix_rejected() {
        let addr = Address::default();
        assert!(encode_bech32("", &addr).is_err());
    }
}
