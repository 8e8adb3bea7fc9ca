use std::fs;
use std::path::Path;

use zeroize::Zeroizing;

/// Loads the signer's root seed from disk (a root extended
/// private key analogue). The file's raw bytes are the seed entropy handed
/// to `fpd_crypto::keyring::Keyring::from_seed`.
pub(crate) fn load_seed(path: &Path) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        anyhow::bail!("seed file at {} is empty", path.display());
    }
    Ok(Zeroizing::new(bytes))
}
