//! Maps Fuel server JSON onto identifiers.

use anyhow::{Context, Result};
use fuel_tools_core::{AssetKind, Identifier};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AssetRecord {
    name: String,
    owner: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "filesize")]
    file_size: Option<u64>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    modify_date: Option<String>,
    #[serde(default)]
    likes: Option<u32>,
    #[serde(default)]
    downloads: Option<u32>,
    #[serde(default)]
    license_name: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    Many(Vec<AssetRecord>),
    One(AssetRecord),
}

impl AssetRecord {
    fn into_identifier(self, server: &str, kind: AssetKind) -> Identifier {
        Identifier {
            server: server.to_string(),
            owner: self.owner,
            name: self.name,
            kind,
            api_version: None,
            description: self.description,
            file_size: self.file_size,
            upload_date: self.upload_date,
            modify_date: self.modify_date,
            likes: self.likes,
            downloads: self.downloads,
            license_name: self.license_name,
            tags: self.tags,
        }
    }
}

/// Decode a single model record served by `server` (a host).
pub fn parse_model(data: &[u8], server: &str) -> Result<Identifier> {
    let record: AssetRecord =
        serde_json::from_slice(data).context("Invalid model JSON")?;
    Ok(record.into_identifier(server, AssetKind::Model))
}

/// Decode a listing of `kind` assets. A lone object is treated as a
/// one-element listing.
pub fn parse_assets(data: &[u8], server: &str, kind: AssetKind) -> Result<Vec<Identifier>> {
    let payload: Payload =
        serde_json::from_slice(data).context("Invalid asset listing JSON")?;
    let records = match payload {
        Payload::Many(records) => records,
        Payload::One(record) => vec![record],
    };
    Ok(records
        .into_iter()
        .map(|record| record.into_identifier(server, kind))
        .collect())
}
