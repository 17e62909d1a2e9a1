use crate::{
    Result,
    operations::{
        GameResultEntry,
        MintCommand,
    },
};
use ethers::types::{
    H256,
    U256,
};

/// Confirmed result of a game-result log submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogReceipt {
    pub tx_hash: H256,
    pub block_number: u64,
}

/// Confirmed result of an NFT mint submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintReceipt {
    pub tx_hash: H256,
    pub token_id: U256,
}

/// Submit-and-await-confirmation primitive over the two casino contracts.
///
/// The queue drives exactly one call at a time and supplies the nonce for
/// every submission.
pub trait ChainWriter {
    /// Next unused nonce for the signing account, pending transactions
    /// included.
    fn pending_nonce(&self) -> impl Future<Output = Result<u64>> + Send;

    fn submit_game_result(
        &self,
        entry: &GameResultEntry,
        nonce: u64,
    ) -> impl Future<Output = Result<LogReceipt>> + Send;

    fn submit_mint(
        &self,
        mint: &MintCommand,
        nonce: u64,
    ) -> impl Future<Output = Result<MintReceipt>> + Send;
}
