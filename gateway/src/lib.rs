//! HTTP gateway for realmlink virtual resources.
//!
//! Hosts a privileged realm (file server over a resource store) and a worker
//! realm (network interceptor) in one process, and answers HTTP requests
//! under the reserved prefix through the interceptor.

pub mod config;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use realmlink_fileserver::{
    FileServer, IndentFormatter, InterceptorConfig, NetworkInterceptor, PublishOptions,
    ResourceRequest, StoreError, SyntheticResponse, VirtualResourceStore,
};
use realmlink_messenger::{GroupChannel, MessengerConfig, MessengerError};
use realmlink_storage::{KvStore, SqliteKvStore, StorageError};
use realmlink_types::{RealmContext, RealmRole};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub use config::GatewayConfig;

/// Name of the group channel shared by the file server and interceptor.
pub const FILE_SERVER_GROUP: &str = "realmlink.files";

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("resource store error: {0}")]
    Store(#[from] StoreError),

    #[error("messenger error: {0}")]
    Messenger(#[from] MessengerError),
}

/// Body of `GET /api/v1/status`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusResponse {
    pub listening: bool,
    pub resources: usize,
    pub prefix: String,
}

/// Both realms of the gateway.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    group: GroupChannel,
    server: FileServer,
    interceptor: NetworkInterceptor,
}

impl Gateway {
    /// Builds both realms and starts the file server listening.
    pub async fn start(config: GatewayConfig) -> GatewayResult<Self> {
        let store = match &config.database {
            Some(path) => {
                let kv: Arc<dyn KvStore> = Arc::new(SqliteKvStore::open(path)?);
                VirtualResourceStore::restore(kv)?
            }
            None => VirtualResourceStore::new(),
        };
        Self::start_with_store(config, Arc::new(store)).await
    }

    /// Like [`start`](Self::start) but over an existing store.
    pub async fn start_with_store(
        config: GatewayConfig,
        store: Arc<VirtualResourceStore>,
    ) -> GatewayResult<Self> {
        let group = GroupChannel::new(FILE_SERVER_GROUP);

        let top = RealmContext::new(RealmRole::Top, config.origin.clone());
        let mut server = FileServer::new(
            top.clone(),
            Arc::new(group.join_as(top.id)),
            store,
            MessengerConfig::default(),
        );
        if config.format {
            server = server.with_formatter(Arc::new(IndentFormatter::default()));
        }

        let worker = RealmContext::new(RealmRole::Worker, config.origin.clone());
        let interceptor = NetworkInterceptor::install(
            worker.clone(),
            Arc::new(group.join_as(worker.id)),
            InterceptorConfig {
                prefix: config.prefix.clone(),
                timeout: config.timeout(),
                messenger: MessengerConfig::default(),
            },
        );

        server.listen().await?;
        info!(origin = %config.origin, prefix = %config.prefix, "gateway started");
        Ok(Self {
            config,
            group,
            server,
            interceptor,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn server(&self) -> &FileServer {
        &self.server
    }

    pub fn interceptor(&self) -> &NetworkInterceptor {
        &self.interceptor
    }

    /// Replaces everything under the prefix with the files in `dir`.
    pub fn publish_dir(&self, dir: &Path) -> GatewayResult<usize> {
        let entries = collect_directory(dir, &self.config.prefix)?;
        let options = PublishOptions {
            scope: self.config.prefix.clone(),
            inject: self.config.inject.clone(),
            format: self.config.format,
        };
        let count = self.server.publish(entries, &options)?;
        info!(dir = %dir.display(), count, "published directory");
        Ok(count)
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            listening: self.server.is_listening(),
            resources: self.server.store().len(),
            prefix: self.config.prefix.clone(),
        }
    }

    /// Tells the interceptor the file server is gone and closes the group.
    pub async fn shutdown(&self) -> GatewayResult<()> {
        self.server.unlisten().await?;
        self.group.close();
        Ok(())
    }
}

/// Reads every file under `dir` as `(prefix + relative path, body)`.
pub fn collect_directory(dir: &Path, prefix: &str) -> GatewayResult<Vec<(String, Vec<u8>)>> {
    let mut files: Vec<PathBuf> = Vec::new();
    walk(dir, &mut files)?;
    files.sort();

    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let Ok(rel) = file.strip_prefix(dir) else { continue };
        let rel: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let path = format!("{prefix}{}", rel.join("/"));
        debug!(%path, "collected file");
        entries.push((path, fs::read(&file)?));
    }
    Ok(entries)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> GatewayResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

fn into_http(response: SyntheticResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let Some(body) = response.body else {
        return status.into_response();
    };
    let mut http = (status, body).into_response();
    if let Some(content_type) = response.content_type {
        http.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type.mime()),
        );
    }
    http
}

async fn status_handler(State(gateway): State<Arc<Gateway>>) -> Json<StatusResponse> {
    Json(gateway.status())
}

async fn resource_handler(State(gateway): State<Arc<Gateway>>, uri: Uri) -> Response {
    let request = ResourceRequest::new(gateway.config.origin.clone(), uri.path());
    match gateway.interceptor.intercept(&request).await {
        Some(response) => into_http(response),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Build the HTTP router. Any path not matched by the API goes through the
/// interceptor; paths outside the prefix are 404.
pub fn build_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/api/v1/status", get(status_handler))
        .fallback(resource_handler)
        .with_state(gateway)
}
