use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Dev,
    Test,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Dev => "dev",
            DeploymentEnv::Test => "test",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Dev => "Devnet",
            DeploymentEnv::Test => "Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub network_url: String,
    pub chain_id: u64,
    pub log_contract_address: String,
    pub nft_contract_address: String,
    #[serde(default)]
    pub deployment_block_height: Option<u64>,
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::open_at(Path::new(DEPLOYMENTS_ROOT), env)
    }

    /// Open a store rooted somewhere other than the working directory.
    pub fn open_at(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: DeploymentRecord) -> Result<()> {
        write_record(&self.path, &record)
    }
}

pub fn ensure_structure() -> Result<()> {
    for env in [
        DeploymentEnv::Dev,
        DeploymentEnv::Test,
        DeploymentEnv::Local,
    ] {
        let _ = ensure_store(Path::new(DEPLOYMENTS_ROOT), env)?;
    }
    Ok(())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    if !root.exists() {
        fs::create_dir_all(root).context("Failed to create .deployments directory")?;
    }

    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!("Failed to create .deployments/{} directory", env.dir_name())
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).with_context(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
        file.write_all(b"").with_context(|| {
            format!("Failed to initialize deployment record file for {}", env)
        })?;
    }

    Ok(file_path)
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) || data.is_empty() {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(Some(record));
    }
    if let Ok(mut records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records.pop());
    }
    Err(anyhow!(
        "Failed to parse deployment record JSON; expected a single deployment object"
    ))
}

fn write_record(path: impl AsRef<Path>, record: &DeploymentRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .context("Failed to serialize deployment record")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment record")?;
    Ok(())
}

pub fn record_deployment(
    env: DeploymentEnv,
    network_url: impl AsRef<str>,
    chain_id: u64,
    log_contract_address: impl AsRef<str>,
    nft_contract_address: impl AsRef<str>,
) -> Result<()> {
    let store = DeploymentStore::new(env)?;
    let record = DeploymentRecord {
        deployed_at: Utc::now().to_rfc3339(),
        network_url: network_url.as_ref().to_string(),
        chain_id,
        log_contract_address: log_contract_address.as_ref().to_string(),
        nft_contract_address: nft_contract_address.as_ref().to_string(),
        deployment_block_height: None,
    };
    store.save(record)
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;

    fn arb_record() -> DeploymentRecord {
        DeploymentRecord {
            deployed_at: Utc::now().to_rfc3339(),
            network_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 31337,
            log_contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
                .to_string(),
            nft_contract_address: "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
                .to_string(),
            deployment_block_height: Some(12),
        }
    }

    #[test]
    fn load__empty_store_returns_none() {
        // given
        let root = tempfile::tempdir().unwrap();
        let store = DeploymentStore::open_at(root.path(), DeploymentEnv::Local).unwrap();

        // when
        let loaded = store.load().unwrap();

        // then
        assert!(loaded.is_none());
    }

    #[test]
    fn save__record_is_readable_back() {
        // given
        let root = tempfile::tempdir().unwrap();
        let store = DeploymentStore::open_at(root.path(), DeploymentEnv::Test).unwrap();
        let record = arb_record();

        // when
        store.save(record.clone()).unwrap();

        // then
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(record.network_url, loaded.network_url);
        assert_eq!(record.chain_id, loaded.chain_id);
        assert_eq!(record.log_contract_address, loaded.log_contract_address);
        assert_eq!(record.nft_contract_address, loaded.nft_contract_address);
        assert_eq!(record.deployment_block_height, loaded.deployment_block_height);
    }

    #[test]
    fn open_at__separates_environments() {
        // given
        let root = tempfile::tempdir().unwrap();
        let local = DeploymentStore::open_at(root.path(), DeploymentEnv::Local).unwrap();
        let test = DeploymentStore::open_at(root.path(), DeploymentEnv::Test).unwrap();

        // when
        local.save(arb_record()).unwrap();

        // then
        assert!(local.load().unwrap().is_some());
        assert!(test.load().unwrap().is_none());
    }
}
