use crate::error::{FuelError, FuelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

pub const DEFAULT_API_VERSION: &str = "1.0";

/// What kind of asset an identifier addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    #[default]
    Model,
    World,
}

impl AssetKind {
    /// Path segment the server uses for this kind, e.g. `models`.
    pub fn segment(&self) -> &'static str {
        match self {
            AssetKind::Model => "models",
            AssetKind::World => "worlds",
        }
    }
}

/// A remote repository the client knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl ServerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_version: default_api_version(),
        }
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Host part of the server URL. A URL without a scheme is taken to be a
    /// bare host.
    pub fn host(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(parsed) if parsed.host_str().is_some() => {
                let host = parsed.host_str().unwrap_or_default();
                match parsed.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                }
            }
            _ => self.url.trim_end_matches('/').to_string(),
        }
    }
}

/// Canonical address of one asset: `(server, owner, name)`.
///
/// Empty `server`, `owner` or `name` fields make the identifier partial;
/// cache queries treat them as wildcards. The optional metadata fields are
/// filled in from server responses and never take part in equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identifier {
    /// Host of the repository, e.g. `fuel.example.org`.
    pub server: String,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub kind: AssetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Identifier {
    /// A complete model identifier with no server. Both segments are
    /// validated.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> FuelResult<Self> {
        let owner = owner.into();
        let name = name.into();
        let unique = format!("{}/{}", owner, name);
        validate_segment(&owner).map_err(|reason| FuelError::parse(&unique, reason))?;
        validate_segment(&name).map_err(|reason| FuelError::parse(&unique, reason))?;
        Ok(Self {
            owner,
            name,
            ..Default::default()
        })
    }

    /// A partial identifier that only constrains the owner.
    pub fn owned_by(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..Default::default()
        }
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn with_kind(mut self, kind: AssetKind) -> Self {
        self.kind = kind;
        self
    }

    /// `owner/name`, independent of the server.
    pub fn unique_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Sub-path of this asset below the cache root.
    pub fn canonical_path(&self) -> PathBuf {
        PathBuf::from(&self.owner).join(&self.name)
    }

    /// Resource path on the server, e.g. `alice/models/Chair`.
    pub fn remote_path(&self) -> String {
        format!("{}/{}/{}", self.owner, self.kind.segment(), self.name)
    }

    /// Resource path of the downloadable archive, e.g. `alice/models/Chair.zip`.
    pub fn archive_path(&self) -> String {
        format!("{}.zip", self.remote_path())
    }

    /// Owner and name are both present and well formed.
    pub fn is_complete(&self) -> bool {
        validate_segment(&self.owner).is_ok() && validate_segment(&self.name).is_ok()
    }

    /// Whether this identifier satisfies `partial`. Empty fields of
    /// `partial` match anything.
    pub fn matches(&self, partial: &Identifier) -> bool {
        (partial.server.is_empty() || partial.server == self.server)
            && (partial.owner.is_empty() || partial.owner == self.owner)
            && (partial.name.is_empty() || partial.name == self.name)
            && partial.kind == self.kind
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.server == other.server
            && self.owner == other.owner
            && self.name == other.name
            && self.kind == other.kind
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.server.hash(state);
        self.owner.hash(state);
        self.name.hash(state);
        self.kind.hash(state);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server.is_empty() {
            write!(f, "{}", self.unique_name())
        } else {
            write!(f, "{}/{}", self.server, self.unique_name())
        }
    }
}

/// Owner and name segments must be non-empty and free of path separators
/// and whitespace.
pub fn validate_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty segment");
    }
    if segment == "." || segment == ".." {
        return Err("relative path segment");
    }
    if segment.contains(['/', '\\']) {
        return Err("segment contains a path separator");
    }
    if segment.chars().any(char::is_whitespace) {
        return Err("segment contains whitespace");
    }
    Ok(())
}
