use crate::{
    Result,
    metadata::{
        NftAttribute,
        NftMetadata,
    },
};
use anyhow::{
    anyhow,
    bail,
};
use chrono::{
    DateTime,
    Utc,
};
use ethers::types::{
    Address,
    H256,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;
use uuid::Uuid;

/// Identifier handed back by enqueue and used for all status lookups.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    pub(crate) fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(raw)?))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    InFlight,
    Completed,
    Failed,
}

/// A validated blockchain write, ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    Log(GameResultEntry),
    Mint(MintCommand),
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Log(_) => "log",
            OperationKind::Mint(_) => "mint",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameResultEntry {
    pub game_type: String,
    pub player: Address,
    pub bet_amount: u64,
    pub payout: u64,
    pub result: serde_json::Value,
    pub entropy_proof: Option<String>,
}

impl GameResultEntry {
    /// JSON document submitted to the log contract alongside the scalar fields.
    pub fn result_json(&self) -> String {
        let mut body = serde_json::json!({ "result": self.result });
        if let Some(proof) = &self.entropy_proof {
            body["entropyProof"] = serde_json::json!(proof);
        }
        body.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MintCommand {
    pub player: Address,
    pub metadata: NftMetadata,
    pub token_uri: Option<String>,
}

/// Wire payload of a game-result enqueue request.
#[derive(Debug, Clone, Deserialize)]
pub struct LogRequest {
    pub game_type: String,
    pub player: String,
    pub bet_amount: i64,
    pub payout: i64,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub entropy_proof: Option<String>,
}

impl LogRequest {
    pub fn validate(self) -> Result<GameResultEntry> {
        if self.game_type.trim().is_empty() {
            bail!("game type must not be empty");
        }
        let player = parse_player_address(&self.player)?;
        if self.bet_amount < 0 {
            bail!("bet amount must not be negative");
        }
        if self.payout < 0 {
            bail!("payout must not be negative");
        }
        let result = match self.result {
            Some(value) if !value.is_null() => value,
            _ => bail!("result object is required"),
        };
        Ok(GameResultEntry {
            game_type: self.game_type,
            player,
            bet_amount: self.bet_amount as u64,
            payout: self.payout as u64,
            result,
            entropy_proof: self.entropy_proof,
        })
    }
}

/// Wire payload of a mint enqueue request.
#[derive(Debug, Clone, Deserialize)]
pub struct MintRequest {
    pub player: String,
    #[serde(default)]
    pub metadata: Option<MetadataRequest>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

/// Metadata fields arrive optional so their absence fails validation instead
/// of deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub attributes: Option<Vec<NftAttribute>>,
}

impl MintRequest {
    pub fn validate(self) -> Result<MintCommand> {
        let player = parse_player_address(&self.player)?;
        let metadata = self
            .metadata
            .ok_or_else(|| anyhow!("metadata object is required"))?;
        let name = match metadata.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => bail!("metadata name is required"),
        };
        let description = match metadata.description {
            Some(description) if !description.trim().is_empty() => description,
            _ => bail!("metadata description is required"),
        };
        let attributes = metadata
            .attributes
            .ok_or_else(|| anyhow!("metadata attributes are required"))?;
        Ok(MintCommand {
            player,
            metadata: NftMetadata {
                name,
                description,
                image: metadata.image,
                attributes,
            },
            token_uri: self.token_uri,
        })
    }
}

fn parse_player_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| anyhow!("'{raw}' is not a valid player address"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OperationOutcome {
    Log { tx_hash: H256, block_number: u64 },
    Mint { tx_hash: H256, token_id: U256 },
}

#[derive(Debug, Clone)]
pub struct QueuedOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub state: OperationState,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub outcome: Option<OperationOutcome>,
}

impl QueuedOperation {
    pub(crate) fn new(kind: OperationKind) -> Self {
        Self {
            id: OperationId::fresh(),
            kind,
            state: OperationState::Pending,
            attempt: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            last_error: None,
            outcome: None,
        }
    }

    pub(crate) fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            id: self.id,
            kind: self.kind.label(),
            state: self.state,
            attempt: self.attempt,
            created_at: self.created_at,
            last_attempt_at: self.last_attempt_at,
            last_error: self.last_error.clone(),
            result: self.outcome,
        }
    }
}

/// Point-in-time view of one operation, safe to hand to callers.
#[derive(Debug, Clone, Serialize)]
pub struct OperationSnapshot {
    pub id: OperationId,
    pub kind: &'static str,
    pub state: OperationState,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub result: Option<OperationOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
    pub is_processing: bool,
}
