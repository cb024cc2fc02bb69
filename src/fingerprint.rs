use sha2::{Digest, Sha256};

/// `sha256:<hex>` digest of downloaded media bytes.
pub fn compute_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}
