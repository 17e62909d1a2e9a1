use crate::Result;
use anyhow::Context;
use base64::{
    Engine as _,
    engine::general_purpose::STANDARD,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct NftAttribute {
    pub trait_type: String,
    pub value: serde_json::Value,
}

/// ERC-721 style metadata for a commemorative game NFT.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct NftMetadata {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub attributes: Vec<NftAttribute>,
}

impl NftMetadata {
    /// Token URI carrying the metadata inline, for mints without a hosted URI.
    pub fn data_uri(&self) -> Result<String> {
        let json = serde_json::to_string(self).context("serializing NFT metadata")?;
        Ok(format!(
            "data:application/json;base64,{}",
            STANDARD.encode(json)
        ))
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;

    fn arb_metadata() -> NftMetadata {
        NftMetadata {
            name: "Wheel Spin #42".to_string(),
            description: "Commemorates a wheel spin on the casino testnet"
                .to_string(),
            image: Some("ipfs://QmWheel/spin.png".to_string()),
            attributes: vec![
                NftAttribute {
                    trait_type: "game".to_string(),
                    value: serde_json::json!("wheel"),
                },
                NftAttribute {
                    trait_type: "payout".to_string(),
                    value: serde_json::json!(500),
                },
            ],
        }
    }

    #[test]
    fn data_uri__embeds_metadata_as_base64_json() {
        // given
        let metadata = arb_metadata();

        // when
        let uri = metadata.data_uri().unwrap();

        // then
        let encoded = uri
            .strip_prefix("data:application/json;base64,")
            .expect("data URI prefix");
        let decoded = STANDARD.decode(encoded).unwrap();
        let roundtripped: NftMetadata = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(metadata, roundtripped);
    }

    #[test]
    fn data_uri__omits_absent_image() {
        // given
        let metadata = NftMetadata {
            image: None,
            ..arb_metadata()
        };

        // when
        let uri = metadata.data_uri().unwrap();

        // then
        let encoded = uri
            .strip_prefix("data:application/json;base64,")
            .expect("data URI prefix");
        let decoded = STANDARD.decode(encoded).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert!(value.get("image").is_none());
    }
}
