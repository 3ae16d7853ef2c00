//! Cache version lifecycle and request strategies.
//!
//! Each cache version owns two named sets: `static-v<N>` (populated
//! all-or-nothing at install from the asset manifest) and `dynamic-v<N>`
//! (populated lazily from live responses, and holding queued attendance
//! mutations). Activation garbage-collects every set that belongs to
//! neither name, so old and new versions never serve together.
//!
//! Strategy selection by request class:
//!
//! - API requests: network-first, falling back to the last good dynamic
//!   entry
//! - manifest assets: cache-first from the static set
//! - everything else: cache-first, then network-first, then the
//!   embedded offline fallback page
//!
//! Each tier makes at most one network attempt and one cache lookup.

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::cache::store::{
    normalize_url, CacheEntry, CacheStore, RequestSnapshot, ResponseSnapshot,
};

/// Page served when every strategy tier has failed.
const OFFLINE_FALLBACK_HTML: &str = include_str!("../../assets/offline.html");

/// Cap on non-pending dynamic entries. The original design let the
/// dynamic set grow without bound; 256 responses is plenty for one
/// employee's request surface while keeping disk usage predictable.
pub const DEFAULT_DYNAMIC_MAX_ENTRIES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLifecycle {
    NotInstalled,
    Installing,
    /// Installed, waiting for activation. The previous version keeps
    /// serving until `activate` runs.
    Waiting,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Lives under the API base URL; network-first.
    Api,
    /// Exact manifest match; cache-first.
    StaticAsset,
    /// Everything else; full fallback chain.
    Other,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache install failed fetching {url}")]
    InstallFailed {
        url: String,
        #[source]
        source: ApiError,
    },

    #[error("cannot activate from lifecycle state {0:?}")]
    NotInstalledForActivation(CacheLifecycle),

    #[error("network unreachable and no cached copy for {0}")]
    Offline(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct CacheManager {
    pub(super) store: CacheStore,
    pub(super) client: Client,
    api_base_url: String,
    static_assets: Vec<String>,
    /// Target cache version for install/activate.
    version: u32,
    /// Version currently serving, if any.
    active_version: Option<u32>,
    lifecycle: CacheLifecycle,
    dynamic_max_entries: usize,
}

fn static_set_name(version: u32) -> String {
    format!("static-v{}", version)
}

fn dynamic_set_name(version: u32) -> String {
    format!("dynamic-v{}", version)
}

impl CacheManager {
    pub fn open(
        store: CacheStore,
        client: Client,
        api_base_url: &str,
        static_assets: &[String],
        version: u32,
        dynamic_max_entries: usize,
    ) -> anyhow::Result<Self> {
        // A previously installed version resumes serving on reopen.
        let active_version = store
            .list_sets()?
            .iter()
            .filter_map(|set| set.strip_prefix("static-v")?.parse::<u32>().ok())
            .max();

        let lifecycle = if active_version.is_some() {
            CacheLifecycle::Active
        } else {
            CacheLifecycle::NotInstalled
        };

        Ok(Self {
            store,
            client,
            api_base_url: normalize_url(api_base_url),
            static_assets: static_assets.iter().map(|u| normalize_url(u)).collect(),
            version,
            active_version,
            lifecycle,
            dynamic_max_entries,
        })
    }

    pub fn lifecycle(&self) -> CacheLifecycle {
        self.lifecycle
    }

    pub fn active_version(&self) -> Option<u32> {
        self.active_version
    }

    pub(super) fn dynamic_set(&self) -> String {
        dynamic_set_name(self.active_version.unwrap_or(self.version))
    }

    fn serving_static_set(&self) -> Option<String> {
        self.active_version.map(static_set_name)
    }

    // ===== Lifecycle =====

    /// Populate the static set for the target version from the asset
    /// manifest. All-or-nothing: any single fetch failure removes the
    /// staging set and leaves the previously active version untouched.
    pub async fn install(&mut self) -> Result<(), CacheError> {
        let staging = static_set_name(self.version);
        self.lifecycle = CacheLifecycle::Installing;
        info!(set = %staging, assets = self.static_assets.len(), "Installing static cache set");

        // Restarted installs begin from a clean set.
        self.store.delete_set(&staging)?;
        self.store.create_set(&staging)?;

        for url in &self.static_assets {
            let request = RequestSnapshot::get(url.clone());
            let failure = match self.live_fetch(&request).await {
                Ok(response) if response.is_success() => {
                    self.store
                        .put(&staging, &CacheEntry::response(request, response))?;
                    None
                }
                Ok(response) => Some(ApiError::from_status(
                    reqwest::StatusCode::from_u16(response.status)
                        .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
                    &response.body_text(),
                )),
                Err(e) => Some(e),
            };

            if let Some(source) = failure {
                warn!(url = %url, error = %source, "Static asset fetch failed, aborting install");
                self.store.delete_set(&staging)?;
                self.lifecycle = if self.active_version.is_some() {
                    CacheLifecycle::Active
                } else {
                    CacheLifecycle::NotInstalled
                };
                return Err(CacheError::InstallFailed {
                    url: url.clone(),
                    source,
                });
            }
        }

        self.lifecycle = CacheLifecycle::Waiting;
        Ok(())
    }

    /// Promote the installed version to serving and delete every set
    /// that is neither the current static nor dynamic set.
    pub fn activate(&mut self) -> Result<(), CacheError> {
        if self.lifecycle != CacheLifecycle::Waiting {
            return Err(CacheError::NotInstalledForActivation(self.lifecycle));
        }

        let keep_static = static_set_name(self.version);
        let keep_dynamic = dynamic_set_name(self.version);
        for set in self.store.list_sets()? {
            if set != keep_static && set != keep_dynamic {
                info!(set = %set, "Removing stale cache set");
                self.store.delete_set(&set)?;
            }
        }

        self.active_version = Some(self.version);
        self.lifecycle = CacheLifecycle::Active;
        Ok(())
    }

    // ===== Strategy selection =====

    pub fn classify(&self, url: &str) -> RequestClass {
        let normalized = normalize_url(url);
        if self.static_assets.iter().any(|a| *a == normalized) {
            RequestClass::StaticAsset
        } else if normalized.starts_with(&self.api_base_url) {
            RequestClass::Api
        } else {
            RequestClass::Other
        }
    }

    /// Route an intercepted request through the strategy for its class.
    /// Until a version is active, requests pass straight to the network.
    pub async fn fetch(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, CacheError> {
        if self.active_version.is_none() {
            return self
                .live_fetch(request)
                .await
                .map_err(|_| CacheError::Offline(request.key()));
        }

        match self.classify(&request.url) {
            RequestClass::Api => self.network_first(request).await,
            RequestClass::StaticAsset => self.cache_first(request).await,
            RequestClass::Other => match self.cache_first(request).await {
                Ok(response) => Ok(response),
                Err(_) => match self.network_first(request).await {
                    Ok(response) => Ok(response),
                    Err(e) => {
                        debug!(key = %request.key(), error = %e, "All strategies failed, serving offline page");
                        Ok(offline_page())
                    }
                },
            },
        }
    }

    /// One live attempt; success is copied into the dynamic set. On
    /// failure the most recent dynamic entry serves instead.
    async fn network_first(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, CacheError> {
        match self.live_fetch(request).await {
            Ok(response) => {
                self.store.put(
                    &self.dynamic_set(),
                    &CacheEntry::response(request.clone(), response.clone()),
                )?;
                self.evict_dynamic()?;
                Ok(response)
            }
            Err(e) => {
                debug!(key = %request.key(), error = %e, "Live fetch failed, trying dynamic cache");
                match self.store.get(&self.dynamic_set(), &request.key())? {
                    Some(CacheEntry {
                        response: Some(cached),
                        ..
                    }) => Ok(cached),
                    _ => Err(CacheError::Offline(request.key())),
                }
            }
        }
    }

    /// Static-set lookup, then one live attempt. Runtime fetches are
    /// never written back; static membership only changes at install.
    async fn cache_first(&self, request: &RequestSnapshot) -> Result<ResponseSnapshot, CacheError> {
        if let Some(set) = self.serving_static_set() {
            if let Some(CacheEntry {
                response: Some(cached),
                ..
            }) = self.store.get(&set, &request.key())?
            {
                return Ok(cached);
            }
        }

        self.live_fetch(request)
            .await
            .map_err(|_| CacheError::Offline(request.key()))
    }

    /// Replay a snapshot against the live network.
    pub(super) async fn live_fetch(
        &self,
        request: &RequestSnapshot,
    ) -> Result<ResponseSnapshot, ApiError> {
        let method =
            reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
                ApiError::Unexpected {
                    status: 0,
                    body: format!("invalid method {:?}", request.method),
                }
            })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(ResponseSnapshot {
            status,
            headers,
            body,
        })
    }

    #[cfg(test)]
    pub(super) fn force_active_for_tests(&mut self, version: u32) {
        self.active_version = Some(version);
        self.lifecycle = CacheLifecycle::Active;
    }

    /// Trim the dynamic set to the configured cap, oldest responses
    /// first. Pending mutations are never evicted.
    fn evict_dynamic(&self) -> anyhow::Result<()> {
        let mut responses: Vec<CacheEntry> = self
            .store
            .entries(&self.dynamic_set())?
            .into_iter()
            .filter(|e| !e.is_pending())
            .collect();
        if responses.len() <= self.dynamic_max_entries {
            return Ok(());
        }

        responses.sort_by_key(|e| e.stored_at);
        let excess = responses.len() - self.dynamic_max_entries;
        for entry in responses.into_iter().take(excess) {
            debug!(key = %entry.key, "Evicting dynamic cache entry");
            self.store.delete(&self.dynamic_set(), &entry.key)?;
        }
        Ok(())
    }
}

fn offline_page() -> ResponseSnapshot {
    ResponseSnapshot {
        status: 200,
        headers: vec![(
            "content-type".to_string(),
            "text/html; charset=utf-8".to_string(),
        )],
        body: OFFLINE_FALLBACK_HTML.as_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn manager_for(server: &MockServer, assets: &[String], version: u32) -> (tempfile::TempDir, CacheManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("sets")).unwrap();
        let manager = CacheManager::open(
            store,
            Client::new(),
            &format!("{}/api", server.uri()),
            assets,
            version,
            DEFAULT_DYNAMIC_MAX_ENTRIES,
        )
        .unwrap();
        (dir, manager)
    }

    fn asset_urls(server: &MockServer, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .map(|n| format!("{}/assets/{}", server.uri(), n))
            .collect()
    }

    #[tokio::test]
    async fn test_install_then_activate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/assets/app.css"))
            .respond_with(ResponseTemplate::new(200).set_body_string("body{}"))
            .mount(&server)
            .await;

        let assets = asset_urls(&server, &["logo.png", "app.css"]);
        let (_dir, mut manager) = manager_for(&server, &assets, 1).await;
        assert_eq!(manager.lifecycle(), CacheLifecycle::NotInstalled);

        manager.install().await.expect("install should succeed");
        assert_eq!(manager.lifecycle(), CacheLifecycle::Waiting);
        assert_eq!(manager.active_version(), None);

        manager.activate().expect("activate should succeed");
        assert_eq!(manager.lifecycle(), CacheLifecycle::Active);
        assert_eq!(manager.active_version(), Some(1));
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let server = MockServer::start().await;
        for name in ["a", "b", "c", "d", "e"] {
            Mock::given(method("GET"))
                .and(path(format!("/assets/{}", name)))
                .respond_with(ResponseTemplate::new(200).set_body_string(name))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/assets/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let assets = asset_urls(&server, &["a", "b", "c", "broken", "d", "e"]);
        let (_dir, mut manager) = manager_for(&server, &assets, 1).await;

        let err = manager.install().await.expect_err("install must fail");
        assert!(matches!(err, CacheError::InstallFailed { .. }));

        // None of the six assets survive and nothing became active.
        assert!(!manager.store.has_set("static-v1"));
        assert_eq!(manager.active_version(), None);
        assert_eq!(manager.lifecycle(), CacheLifecycle::NotInstalled);
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_version_active() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v1"))
            .mount(&server)
            .await;

        let assets = asset_urls(&server, &["a"]);
        let (_dir, mut manager) = manager_for(&server, &assets, 1).await;
        manager.install().await.unwrap();
        manager.activate().unwrap();

        // Version 2 wants an asset the server no longer has.
        manager.version = 2;
        manager.static_assets = asset_urls(&server, &["a", "missing"]);
        let err = manager.install().await.expect_err("v2 install must fail");
        assert!(matches!(err, CacheError::InstallFailed { .. }));

        assert_eq!(manager.active_version(), Some(1));
        assert_eq!(manager.lifecycle(), CacheLifecycle::Active);
        assert!(manager.store.has_set("static-v1"));
        assert!(!manager.store.has_set("static-v2"));
    }

    #[tokio::test]
    async fn test_activate_garbage_collects_stale_sets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x"))
            .mount(&server)
            .await;

        let assets = asset_urls(&server, &["a"]);
        let (_dir, mut manager) = manager_for(&server, &assets, 3).await;
        // Leftovers from older versions.
        manager.store.create_set("static-v2").unwrap();
        manager.store.create_set("dynamic-v2").unwrap();

        manager.install().await.unwrap();
        manager.activate().unwrap();

        assert_eq!(
            manager.store.list_sets().unwrap(),
            vec!["static-v3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_activate_requires_waiting_state() {
        let server = MockServer::start().await;
        let (_dir, mut manager) = manager_for(&server, &[], 1).await;
        let err = manager.activate().expect_err("activate before install must fail");
        assert!(matches!(err, CacheError::NotInstalledForActivation(_)));
    }

    #[tokio::test]
    async fn test_cache_first_is_idempotent_and_offline_capable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pixels".to_vec()))
            .expect(1) // install only; later fetches come from cache
            .mount(&server)
            .await;

        let assets = asset_urls(&server, &["logo.png"]);
        let (_dir, mut manager) = manager_for(&server, &assets, 1).await;
        manager.install().await.unwrap();
        manager.activate().unwrap();

        let request = RequestSnapshot::get(assets[0].clone());
        let first = manager.fetch(&request).await.unwrap();
        let second = manager.fetch(&request).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.body, b"pixels");
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_dynamic_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/attendance-records"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[{\"live\":true}]"))
            .mount(&server)
            .await;

        let (_dir, mut manager) = manager_for(&server, &[], 1).await;
        manager.store.create_set("static-v1").unwrap();
        manager.active_version = Some(1);
        manager.lifecycle = CacheLifecycle::Active;

        let request = RequestSnapshot::get(format!("{}/api/attendance-records", server.uri()));
        assert_eq!(manager.classify(&request.url), RequestClass::Api);

        let live = manager.fetch(&request).await.unwrap();
        assert_eq!(live.body_text(), "[{\"live\":true}]");

        // Take the network away; the stored copy must serve.
        drop(server);
        let cached = manager.fetch(&request).await.unwrap();
        assert_eq!(cached.body_text(), "[{\"live\":true}]");
    }

    #[tokio::test]
    async fn test_api_miss_with_no_cache_is_offline_error() {
        // Non-pooled server: a pooled `MockServer::start()` keeps its
        // listener alive after drop, so the outage would answer 404.
        let server = MockServer::builder().start().await;
        let (_dir, mut manager) = manager_for(&server, &[], 1).await;
        manager.active_version = Some(1);
        manager.lifecycle = CacheLifecycle::Active;
        let api_base = server.uri();
        drop(server);

        let request = RequestSnapshot::get(format!("{}/api/attendance-records", api_base));
        let err = manager.fetch(&request).await.expect_err("must fail offline");
        assert!(matches!(err, CacheError::Offline(_)));
    }

    #[tokio::test]
    async fn test_unclassified_request_gets_offline_page() {
        let server = MockServer::start().await;
        let (_dir, mut manager) = manager_for(&server, &[], 1).await;
        manager.active_version = Some(1);
        manager.lifecycle = CacheLifecycle::Active;

        let request = RequestSnapshot::get("http://127.0.0.1:1/somewhere-else");
        let response = manager.fetch(&request).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(response.body_text().contains("offline"));
    }

    #[tokio::test]
    async fn test_dynamic_set_eviction_spares_pending_mutations() {
        let server = MockServer::start().await;
        for name in ["one", "two", "three"] {
            Mock::given(method("GET"))
                .and(path(format!("/api/{}", name)))
                .respond_with(ResponseTemplate::new(200).set_body_string(name))
                .mount(&server)
                .await;
        }

        let (_dir, mut manager) = manager_for(&server, &[], 1).await;
        manager.active_version = Some(1);
        manager.lifecycle = CacheLifecycle::Active;
        manager.dynamic_max_entries = 2;

        let pending = CacheEntry::pending(RequestSnapshot {
            method: "POST".to_string(),
            url: format!("{}/api/attendance/check-in", server.uri()),
            headers: Vec::new(),
            body: None,
        });
        manager.store.put(&manager.dynamic_set(), &pending).unwrap();

        for name in ["one", "two", "three"] {
            let request = RequestSnapshot::get(format!("{}/api/{}", server.uri(), name));
            manager.fetch(&request).await.unwrap();
        }

        let entries = manager.store.entries(&manager.dynamic_set()).unwrap();
        let responses = entries.iter().filter(|e| !e.is_pending()).count();
        let pendings = entries.iter().filter(|e| e.is_pending()).count();
        assert_eq!(responses, 2, "oldest response should be evicted");
        assert_eq!(pendings, 1, "pending mutation must survive eviction");
    }
}
