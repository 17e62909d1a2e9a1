use anyhow::{
    Context,
    anyhow,
};
use chain_writer::{
    api::StatusApi,
    init_tracing,
    queue::{
        TxQueue,
        ethereum::EthereumChainWriter,
        retry::RetryPolicy,
    },
    signer,
};
use clap::{
    ArgGroup,
    Parser,
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
};
use ethers::types::Address;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = None,
    group(
        ArgGroup::new("network")
            .args(["local", "dev", "test"])
            .required(true)
    )
)]
struct Args {
    #[arg(short, long)]
    rpc_url: Option<Url>,

    #[arg(long)]
    chain_id: Option<u64>,

    #[arg(long)]
    log_contract: Option<String>,

    #[arg(long)]
    nft_contract: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long, default_value = "false")]
    tracing: bool,

    #[arg(long)]
    wallet: Option<String>,

    #[arg(long)]
    wallet_dir: Option<String>,

    #[arg(long)]
    local: bool,

    #[arg(long)]
    dev: bool,

    #[arg(long)]
    test: bool,
}

async fn handle_interrupt() {
    let res = tokio::signal::ctrl_c().await;
    match res {
        Ok(_) => {
            tracing::info!("Received interrupt, exiting");
        }
        Err(_) => {
            tracing::warn!("Received interrupt error, exiting anyway");
        }
    }
}

fn parse_contract_address(raw: &str) -> anyhow::Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| anyhow!("Failed to parse contract address '{raw}': {e:?}"))
}

fn resolve_signer(args: &Args) -> anyhow::Result<Option<ethers::signers::LocalWallet>> {
    if let Some(wallet) = signer::signer_from_env()? {
        return Ok(Some(wallet));
    }
    match &args.wallet {
        Some(name) => {
            let dir = signer::resolve_wallet_dir(args.wallet_dir.as_deref())?;
            let descriptor = signer::find_wallet(&dir, name)?;
            Ok(Some(signer::unlock_wallet(&descriptor)?))
        }
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.tracing {
        init_tracing();
    }
    let (deployment_env, network_label) = if args.local {
        (DeploymentEnv::Local, "local")
    } else if args.dev {
        (DeploymentEnv::Dev, "dev")
    } else {
        (DeploymentEnv::Test, "test")
    };
    let store =
        DeploymentStore::new(deployment_env).context("opening deployments store")?;
    let record = store.load().context("loading deployment")?;

    let network_url = match (&args.rpc_url, &record) {
        (Some(url), _) => url.to_string(),
        (None, Some(record)) => record.network_url.clone(),
        (None, None) => {
            return Err(anyhow!(
                "No deployment record found for {network_label}; provide --rpc-url"
            ));
        }
    };
    let chain_id = match (args.chain_id, &record) {
        (Some(chain_id), _) => chain_id,
        (None, Some(record)) => record.chain_id,
        (None, None) => {
            return Err(anyhow!(
                "No deployment record found for {network_label}; provide --chain-id"
            ));
        }
    };
    let log_contract = match (&args.log_contract, &record) {
        (Some(raw), _) => parse_contract_address(raw).context("parsing --log-contract")?,
        (None, Some(record)) => parse_contract_address(&record.log_contract_address)
            .with_context(|| {
                format!(
                    "parsing log contract from deployment record {}",
                    record.log_contract_address
                )
            })?,
        (None, None) => {
            return Err(anyhow!(
                "No deployment record found for {network_label}; provide --log-contract"
            ));
        }
    };
    let nft_contract = match (&args.nft_contract, &record) {
        (Some(raw), _) => parse_contract_address(raw).context("parsing --nft-contract")?,
        (None, Some(record)) => parse_contract_address(&record.nft_contract_address)
            .with_context(|| {
                format!(
                    "parsing NFT contract from deployment record {}",
                    record.nft_contract_address
                )
            })?,
        (None, None) => {
            return Err(anyhow!(
                "No deployment record found for {network_label}; provide --nft-contract"
            ));
        }
    };

    if let Some(record) = &record {
        tracing::info!(
            "Using deployment record for {} (network {}, chain id {}) deployed at {}",
            network_label,
            record.network_url,
            record.chain_id,
            record.deployed_at,
        );
    } else {
        tracing::info!(
            "Using contracts provided via CLI override on {} (chain id {})",
            network_url,
            chain_id,
        );
    }

    let writer = match resolve_signer(&args)? {
        Some(wallet) => {
            let writer = EthereumChainWriter::new(
                &network_url,
                wallet,
                chain_id,
                log_contract,
                nft_contract,
            )?;
            tracing::info!("Submitting writes as {:?}", writer.signer_address());
            Some(writer)
        }
        None => {
            tracing::warn!(
                "No signing credential configured; operations will queue but not submit"
            );
            None
        }
    };

    let queue = TxQueue::new(writer, RetryPolicy::default());
    let api = StatusApi::new(queue, args.port).await?;
    tracing::info!("Starting chain writer service on {}", api.base_url());

    handle_interrupt().await;
    tracing::info!("Exiting chain writer service");
    drop(api);
    Ok(())
}
