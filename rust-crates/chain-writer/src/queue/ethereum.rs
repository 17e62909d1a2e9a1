use crate::{
    Result,
    operations::{
        GameResultEntry,
        MintCommand,
    },
    queue::chain_writer::{
        ChainWriter,
        LogReceipt,
        MintReceipt,
    },
};
use anyhow::{
    Context,
    anyhow,
    bail,
};
use ethers::{
    abi::{
        AbiDecode,
        Token,
    },
    middleware::SignerMiddleware,
    providers::{
        Http,
        Middleware,
        Provider,
    },
    signers::{
        LocalWallet,
        Signer,
    },
    types::{
        Address,
        BlockNumber,
        Bytes,
        H256,
        TransactionReceipt,
        TransactionRequest,
        U64,
        U256,
        transaction::eip2718::TypedTransaction,
    },
    utils::keccak256,
};

const LOG_GAME_RESULT_SIGNATURE: &str =
    "logGameResult(string,address,uint256,uint256,string)";
const MINT_GAME_NFT_SIGNATURE: &str = "mintGameNft(address,string)";
const TOTAL_MINTED_SIGNATURE: &str = "totalMinted()";
const TRANSFER_EVENT_SIGNATURE: &str = "Transfer(address,address,uint256)";

/// Writer over the casino's two contracts, signing every submission with one
/// local key through a JSON-RPC provider.
pub struct EthereumChainWriter {
    client: SignerMiddleware<Provider<Http>, LocalWallet>,
    log_contract: Address,
    nft_contract: Address,
}

impl EthereumChainWriter {
    pub fn new(
        rpc_url: &str,
        wallet: LocalWallet,
        chain_id: u64,
        log_contract: Address,
        nft_contract: Address,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("connecting provider to {rpc_url}"))?;
        let wallet = wallet.with_chain_id(chain_id);
        let client = SignerMiddleware::new(provider, wallet);
        Ok(Self {
            client,
            log_contract,
            nft_contract,
        })
    }

    pub fn signer_address(&self) -> Address {
        self.client.signer().address()
    }

    async fn submit(
        &self,
        to: Address,
        data: Vec<u8>,
        nonce: u64,
    ) -> Result<TransactionReceipt> {
        let tx = TransactionRequest::new()
            .to(to)
            .data(Bytes::from(data))
            .nonce(nonce);
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .context("submitting transaction")?;
        let receipt = pending
            .await
            .context("awaiting transaction confirmation")?
            .ok_or_else(|| anyhow!("transaction dropped before confirmation"))?;
        if receipt.status == Some(U64::zero()) {
            bail!("transaction {:?} reverted", receipt.transaction_hash);
        }
        Ok(receipt)
    }

    /// The id of the most recent mint is the NFT contract's counter minus one.
    async fn last_minted_token_id(&self) -> Result<U256> {
        let call: TypedTransaction = TransactionRequest::new()
            .to(self.nft_contract)
            .data(Bytes::from(encode_call(TOTAL_MINTED_SIGNATURE, &[])))
            .into();
        let raw = self
            .client
            .call(&call, None)
            .await
            .context("reading NFT token counter")?;
        let counter =
            U256::decode(raw.as_ref()).context("decoding NFT token counter")?;
        if counter.is_zero() {
            bail!("NFT contract reports no minted tokens");
        }
        Ok(counter - 1)
    }
}

impl ChainWriter for EthereumChainWriter {
    async fn pending_nonce(&self) -> Result<u64> {
        let nonce = self
            .client
            .get_transaction_count(
                self.signer_address(),
                Some(BlockNumber::Pending.into()),
            )
            .await
            .context("reading account transaction count")?;
        Ok(nonce.as_u64())
    }

    async fn submit_game_result(
        &self,
        entry: &GameResultEntry,
        nonce: u64,
    ) -> Result<LogReceipt> {
        let data = encode_log_game_result(entry);
        let receipt = self.submit(self.log_contract, data, nonce).await?;
        let block_number = receipt
            .block_number
            .ok_or_else(|| anyhow!("confirmed transaction missing block number"))?
            .as_u64();
        Ok(LogReceipt {
            tx_hash: receipt.transaction_hash,
            block_number,
        })
    }

    async fn submit_mint(&self, mint: &MintCommand, nonce: u64) -> Result<MintReceipt> {
        let token_uri = match &mint.token_uri {
            Some(uri) => uri.clone(),
            None => mint.metadata.data_uri()?,
        };
        let data = encode_mint_game_nft(mint.player, &token_uri);
        let receipt = self.submit(self.nft_contract, data, nonce).await?;
        let token_id = match token_id_from_receipt(&receipt, self.nft_contract) {
            Some(token_id) => token_id,
            None => {
                tracing::warn!(
                    tx_hash = ?receipt.transaction_hash,
                    "mint receipt carried no parseable transfer event; reading token counter"
                );
                self.last_minted_token_id().await?
            }
        };
        Ok(MintReceipt {
            tx_hash: receipt.transaction_hash,
            token_id,
        })
    }
}

fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = keccak256(signature.as_bytes())[0..4].to_vec();
    data.extend_from_slice(&ethers::abi::encode(tokens));
    data
}

pub(crate) fn encode_log_game_result(entry: &GameResultEntry) -> Vec<u8> {
    encode_call(
        LOG_GAME_RESULT_SIGNATURE,
        &[
            Token::String(entry.game_type.clone()),
            Token::Address(entry.player),
            Token::Uint(U256::from(entry.bet_amount)),
            Token::Uint(U256::from(entry.payout)),
            Token::String(entry.result_json()),
        ],
    )
}

pub(crate) fn encode_mint_game_nft(player: Address, token_uri: &str) -> Vec<u8> {
    encode_call(
        MINT_GAME_NFT_SIGNATURE,
        &[
            Token::Address(player),
            Token::String(token_uri.to_string()),
        ],
    )
}

/// Token id from the ERC-721 transfer event emitted by the mint, if present.
pub(crate) fn token_id_from_receipt(
    receipt: &TransactionReceipt,
    nft_contract: Address,
) -> Option<U256> {
    let transfer_topic = H256::from(keccak256(TRANSFER_EVENT_SIGNATURE.as_bytes()));
    receipt
        .logs
        .iter()
        .filter(|log| log.address == nft_contract)
        .find(|log| log.topics.first() == Some(&transfer_topic) && log.topics.len() == 4)
        .map(|log| U256::from_big_endian(log.topics[3].as_bytes()))
}
