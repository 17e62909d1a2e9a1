use crate::Result;
use anyhow::{
    Context,
    anyhow,
};
use eth_keystore::decrypt_key;
use ethers::signers::LocalWallet;
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

/// Env var holding a hex-encoded signing key for headless deployments.
pub const SIGNER_KEY_ENV: &str = "CHAIN_WRITER_SIGNER_KEY";

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

/// Signer from the environment, if one is configured. Absence is not an
/// error; the queue then runs in enqueue-only mode.
pub fn signer_from_env() -> Result<Option<LocalWallet>> {
    let Ok(raw) = std::env::var(SIGNER_KEY_ENV) else {
        return Ok(None);
    };
    let trimmed = raw.trim().trim_start_matches("0x");
    let bytes = hex::decode(trimmed)
        .with_context(|| format!("decoding {SIGNER_KEY_ENV} as hex"))?;
    let wallet = LocalWallet::from_bytes(&bytes)
        .with_context(|| format!("{SIGNER_KEY_ENV} did not contain a valid signing key"))?;
    Ok(Some(wallet))
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".chain-writer").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).context("Failed to read wallet directory")? {
        let entry = entry.context("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| anyhow!("Invalid wallet filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| anyhow!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

/// Unlock an encrypted keystore, prompting for its password.
pub fn unlock_wallet(descriptor: &WalletDescriptor) -> Result<LocalWallet> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).context("Failed to read wallet password")?;

    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| anyhow!("Invalid password for wallet '{}'", descriptor.name))?;

    LocalWallet::from_bytes(&secret).map_err(|_| {
        anyhow!(
            "Wallet '{}' contained unsupported key material",
            descriptor.name
        )
    })
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_wallets__missing_directory_is_empty() {
        // given
        let dir = Path::new("/definitely/not/a/wallet/dir");

        // when
        let wallets = list_wallets(dir).unwrap();

        // then
        assert!(wallets.is_empty());
    }

    #[test]
    fn list_wallets__returns_keystores_sorted_by_name() {
        // given
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta.json", "alpha.json", "notes.txt"] {
            fs::write(dir.path().join(name), b"{}").unwrap();
        }

        // when
        let wallets = list_wallets(dir.path()).unwrap();

        // then
        let names: Vec<_> = wallets.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn find_wallet__unknown_name_is_an_error() {
        // given
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha.json"), b"{}").unwrap();

        // when
        let result = find_wallet(dir.path(), "beta");

        // then
        assert!(result.is_err());
    }
}
