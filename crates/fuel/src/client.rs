use crate::cache::{AssetIter, LocalCache};
use crate::config::ClientConfig;
use crate::json;
use crate::resolver;
use crate::transport::{SurfTransport, Transport};
use fuel_tools_core::protocol::RestRequest;
use fuel_tools_core::{AssetKind, CacheStatus, FuelError, FuelResult, Identifier, ServerConfig};
use futures::future::join_all;
use std::path::{Path, PathBuf};

const JSON: &str = "application/json";
const ZIP: &str = "application/zip";

/// High level interface to Fuel servers and the local cache.
///
/// Each request is resolved, checked against the cache, fetched if needed,
/// and written back to the cache on success.
pub struct FuelClient {
    config: ClientConfig,
    transport: Box<dyn Transport>,
    cache: LocalCache,
}

impl FuelClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Box::new(SurfTransport::new()))
    }

    pub fn with_transport(config: ClientConfig, transport: Box<dyn Transport>) -> Self {
        let cache = LocalCache::new(config.cache_location());
        Self {
            config,
            transport,
            cache,
        }
    }

    /// Client configured from the environment, see [`ClientConfig::load`].
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(ClientConfig::load()?))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Servers may be changed at any time; the cache root is fixed at
    /// construction.
    pub fn config_mut(&mut self) -> &mut ClientConfig {
        &mut self.config
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn parse_model_url(&self, url: &str) -> FuelResult<Identifier> {
        resolver::parse_model_url(url, self.config.servers())
    }

    pub fn parse_model_file_url(&self, url: &str) -> FuelResult<(Identifier, String)> {
        resolver::parse_model_file_url(url, self.config.servers())
    }

    /// Fetch the server's metadata record for `id`. Never cached.
    pub async fn model_details(&self, id: &Identifier) -> FuelResult<Identifier> {
        let server = self.server_for(id)?;
        if !id.is_complete() {
            return Err(FuelError::parse(id.unique_name(), "owner and name are required"));
        }

        let data = self.fetch(server, &id.remote_path(), JSON).await?;
        let mut details = json::parse_model(&data, &server.host())
            .map_err(|e| FuelError::fetch(server.url.as_str(), format!("{:#}", e)))?;
        details.api_version = Some(server.api_version.clone());
        Ok(details)
    }

    /// Every model on the configured servers. If the servers cannot be
    /// listed, the cached models are returned instead.
    pub async fn models(&self) -> AssetIter {
        match self.list_all(AssetKind::Model).await {
            Ok(models) => AssetIter::new(models),
            Err(e) => {
                log::warn!(
                    "Failed to fetch models from server, returning cached models: {}",
                    e
                );
                self.cache.all_models()
            }
        }
    }

    /// Models matching `partial`, from the cache if it has any, otherwise
    /// from the servers. Server results are not written to the cache.
    pub async fn models_matching(&self, partial: &Identifier) -> FuelResult<AssetIter> {
        {
            let mut local = self.cache.matching_models(partial);
            if !local.is_empty() {
                return Ok(local);
            }
        }

        log::info!(
            "{} not found in cache, attempting download",
            partial.unique_name()
        );
        let remote = self.list_scoped(partial, AssetKind::Model).await?;
        Ok(AssetIter::new(remote))
    }

    /// Every world on the configured servers.
    pub async fn worlds(&self) -> FuelResult<AssetIter> {
        Ok(AssetIter::new(self.list_all(AssetKind::World).await?))
    }

    /// Worlds matching `partial`. Worlds are not cached.
    pub async fn worlds_matching(&self, partial: &Identifier) -> FuelResult<AssetIter> {
        let partial = partial.clone().with_kind(AssetKind::World);
        Ok(AssetIter::new(
            self.list_scoped(&partial, AssetKind::World).await?,
        ))
    }

    /// Download the model archive and replace any cached copy with it.
    /// Returns the cache path of the model.
    pub async fn download_model(&self, id: &Identifier) -> FuelResult<PathBuf> {
        let server = self.server_for(id)?;
        if !id.is_complete() {
            return Err(FuelError::parse(id.unique_name(), "owner and name are required"));
        }

        let data = self.fetch(server, &id.archive_path(), ZIP).await?;

        let mut saved = id.clone();
        saved.server = server.host();
        saved.api_version = Some(server.api_version.clone());
        self.cache.save_model(&saved, &data, true)
    }

    /// Download the model named by a full model URL,
    /// `<scheme>://<server>/<version>/<owner>/models/<name>`.
    ///
    /// A URL that does not have that form fails with [`FuelError::Fetch`]
    /// before any request is made.
    pub async fn download_model_url(&self, url: &str) -> FuelResult<PathBuf> {
        let id = resolver::parse_model_url_strict(url, self.config.servers()).map_err(|e| {
            log::error!("Cannot download {}: {}", url, e);
            FuelError::fetch(url, e.to_string())
        })?;
        self.download_model(&id).await?;
        Ok(self
            .config
            .cache_location()
            .join(&id.owner)
            .join(&id.name))
    }

    /// Whether the model named by `url` is cached. No network access.
    pub fn cached_model(&self, url: &str) -> FuelResult<CacheStatus> {
        let id = self.parse_model_url(url)?;
        Ok(match self.cache.cached_model(&id) {
            Some(path) => CacheStatus::AlreadyExists(path),
            None => CacheStatus::NotCached,
        })
    }

    /// Whether the model file named by `url` is cached. No network access.
    pub fn cached_model_file(&self, url: &str) -> FuelResult<CacheStatus> {
        let (id, file_path) = self.parse_model_file_url(url)?;
        Ok(match self.cache.cached_model_file(&id, &file_path) {
            Some(path) => CacheStatus::AlreadyExists(path),
            None => CacheStatus::NotCached,
        })
    }

    /// Not supported yet; always fails with [`FuelError::Upload`].
    pub fn upload_model(&self, _model_dir: &Path, id: &Identifier) -> FuelResult<()> {
        Err(FuelError::Upload(id.unique_name()))
    }

    /// Not supported yet; always fails with [`FuelError::Delete`].
    pub fn delete_model(&self, id: &Identifier) -> FuelResult<()> {
        Err(FuelError::Delete(id.unique_name()))
    }

    /// The configured server for the identifier's host, else the default.
    fn server_for(&self, id: &Identifier) -> FuelResult<&ServerConfig> {
        if !id.server.is_empty() {
            if let Some(server) = self.config.server_for_host(&id.server) {
                return Ok(server);
            }
        }
        self.config.default_server().ok_or_else(|| {
            log::error!("No servers found");
            FuelError::NoServersConfigured
        })
    }

    fn servers_for_listing(&self, partial: &Identifier) -> FuelResult<Vec<&ServerConfig>> {
        if !partial.server.is_empty() {
            if let Some(server) = self.config.server_for_host(&partial.server) {
                return Ok(vec![server]);
            }
        }
        if self.config.servers().is_empty() {
            log::error!("No servers found");
            return Err(FuelError::NoServersConfigured);
        }
        Ok(self.config.servers().iter().collect())
    }

    async fn fetch(
        &self,
        server: &ServerConfig,
        path: &str,
        accept: &str,
    ) -> FuelResult<Vec<u8>> {
        let request = RestRequest::get(server.url.as_str(), server.api_version.as_str(), path)
            .with_header("Accept", accept);
        let url = request.url();
        log::debug!("GET {}", url);

        let response = self
            .transport
            .request(request)
            .await
            .map_err(|e| FuelError::fetch(url.as_str(), format!("{:#}", e)))?;

        if !response.is_success() {
            return Err(FuelError::fetch(url, format!("status {}", response.status)));
        }
        Ok(response.data)
    }

    async fn list(
        &self,
        server: &ServerConfig,
        path: &str,
        kind: AssetKind,
    ) -> FuelResult<Vec<Identifier>> {
        let data = self.fetch(server, path, JSON).await?;
        let mut assets = json::parse_assets(&data, &server.host(), kind)
            .map_err(|e| FuelError::fetch(server.url.as_str(), format!("{:#}", e)))?;
        for asset in &mut assets {
            asset.api_version = Some(server.api_version.clone());
        }
        Ok(assets)
    }

    /// Listings from every configured server, in configuration order.
    async fn list_all(&self, kind: AssetKind) -> FuelResult<Vec<Identifier>> {
        let servers = self.servers_for_listing(&Identifier::default())?;
        let listings = join_all(
            servers
                .into_iter()
                .map(|server| self.list(server, kind.segment(), kind)),
        )
        .await;

        let mut assets = Vec::new();
        for listing in listings {
            assets.extend(listing?);
        }
        Ok(assets)
    }

    async fn list_scoped(
        &self,
        partial: &Identifier,
        kind: AssetKind,
    ) -> FuelResult<Vec<Identifier>> {
        let segment = kind.segment();
        let path = match (partial.owner.is_empty(), partial.name.is_empty()) {
            (false, false) => format!("{}/{}/{}", partial.owner, segment, partial.name),
            (false, true) => format!("{}/{}", partial.owner, segment),
            _ => segment.to_string(),
        };

        let servers = self.servers_for_listing(partial)?;
        let listings = join_all(
            servers
                .into_iter()
                .map(|server| self.list(server, &path, kind)),
        )
        .await;

        // The server picks the scope; owner and name are re-checked here
        // because a name-only query lists everything.
        let mut filter = partial.clone().with_kind(kind);
        filter.server.clear();

        let mut assets = Vec::new();
        for listing in listings {
            assets.extend(listing?.into_iter().filter(|asset| asset.matches(&filter)));
        }
        Ok(assets)
    }
}
