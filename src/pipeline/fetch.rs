//! Fetch phase: walk `{base_url}1`, `{base_url}2`, … until the first absence.
//!
//! The number of resources is not known up front; the only way to learn it is
//! to request index `n + 1` and observe that it is absent. [`ResourceWalk`]
//! makes that loop an explicit iterator. `next_resource` takes `&mut self`,
//! so two requests can never be in flight at once, and each resource is on
//! disk before the walk moves to the next index. Nothing downstream starts
//! until [`fetch_all`] returns, so a crash during conversion or assembly never
//! loses fetched data.
//!
//! ## Known ambiguity
//!
//! A 404, any other status, an empty body and a transport error all end the
//! walk the same way. A connection reset at index 40 of 80 therefore looks
//! exactly like a 39-resource series. The behaviour is kept, but the reason is
//! carried in [`AbsentReason`] and logged at `warn` whenever it is not a
//! plain 404, so callers can tell the difference after the fact.

use crate::config::{OutputLayout, PipelineConfig};
use crate::error::PipelineError;
use crate::output::ResourceDescriptor;
use crate::progress::ProgressCallback;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why an index was treated as the end of the series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbsentReason {
    /// HTTP 404.
    NotFound,
    /// Any other non-200 status.
    Status(u16),
    /// HTTP 200 with no body.
    EmptyBody,
    /// The request or the body read failed.
    Transport(String),
}

impl AbsentReason {
    /// `true` only for a 404, the one unambiguous end-of-series signal.
    pub fn is_definitive(&self) -> bool {
        matches!(self, AbsentReason::NotFound)
    }
}

impl fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsentReason::NotFound => write!(f, "HTTP 404"),
            AbsentReason::Status(code) => write!(f, "HTTP {code}"),
            AbsentReason::EmptyBody => write!(f, "empty body"),
            AbsentReason::Transport(detail) => write!(f, "transport error: {detail}"),
        }
    }
}

/// Result of asking a source for one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Bytes(Vec<u8>),
    Absent(AbsentReason),
}

/// Something that serves resources by 1-based index.
pub trait ResourceSource: Send + Sync {
    /// Retrieve resource `index`. Every failure is [`Fetched::Absent`].
    fn fetch(&self, index: u32) -> impl Future<Output = Fetched> + Send;

    /// Human-readable location, used in logs and errors.
    fn describe(&self) -> String;
}

// ── HTTP source ──────────────────────────────────────────────────────────

/// Fetches `GET {base_url}{index}` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    /// Build a source from a validated config.
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn url(&self, index: u32) -> String {
        format!("{}{}", self.base_url, index)
    }
}

impl ResourceSource for HttpSource {
    async fn fetch(&self, index: u32) -> Fetched {
        let url = self.url(index);
        debug!("GET {}", url);

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return Fetched::Absent(AbsentReason::Transport(e.to_string())),
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Fetched::Absent(AbsentReason::NotFound),
            other => return Fetched::Absent(AbsentReason::Status(other.as_u16())),
        }

        match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => Fetched::Absent(AbsentReason::EmptyBody),
            Ok(bytes) => Fetched::Bytes(bytes.to_vec()),
            Err(e) => Fetched::Absent(AbsentReason::Transport(e.to_string())),
        }
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

// ── The walk ─────────────────────────────────────────────────────────────

/// Sequential iterator over a resource series, terminated by absence.
///
/// Once an index is absent the walk is finished and every later call
/// returns `Ok(None)` without touching the source.
pub struct ResourceWalk<'a, S> {
    source: &'a S,
    layout: &'a OutputLayout,
    progress: Option<&'a ProgressCallback>,
    next_index: u32,
    terminal: Option<AbsentReason>,
}

impl<'a, S: ResourceSource> ResourceWalk<'a, S> {
    pub fn new(source: &'a S, layout: &'a OutputLayout) -> Self {
        Self {
            source,
            layout,
            progress: None,
            next_index: 1,
            terminal: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<&'a ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Fetch and persist the next resource.
    ///
    /// Returns `Ok(None)` once the series has ended. A failure to write the
    /// resource to disk is fatal.
    pub async fn next_resource(&mut self) -> Result<Option<ResourceDescriptor>, PipelineError> {
        if self.terminal.is_some() {
            return Ok(None);
        }

        let index = self.next_index;
        let bytes = match self.source.fetch(index).await {
            Fetched::Bytes(bytes) => bytes,
            Fetched::Absent(reason) => {
                if reason.is_definitive() {
                    info!("Index {} absent ({}); series ends", index, reason);
                } else {
                    warn!(
                        "Index {} treated as end of series after {}; this may hide a transient failure",
                        index, reason
                    );
                }
                self.terminal = Some(reason);
                return Ok(None);
            }
        };

        let path = self.layout.resource_path(index);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|source| PipelineError::ResourceWriteFailed {
                index,
                path: path.clone(),
                source,
            })?;

        debug!("Stored resource {} → {} ({} bytes)", index, path.display(), bytes.len());
        if let Some(cb) = self.progress {
            cb.on_resource_secured(index, bytes.len() as u64);
        }

        self.next_index += 1;
        Ok(Some(ResourceDescriptor {
            index,
            storage_path: path,
        }))
    }

    /// Index that will be (or was) found absent.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Why the walk ended, once it has.
    pub fn terminal(&self) -> Option<&AbsentReason> {
        self.terminal.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.terminal.is_some()
    }
}

/// Outcome of a complete walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    /// Contiguous, ascending, starting at 1.
    pub resources: Vec<ResourceDescriptor>,
    /// Always `resources.len() + 1`.
    pub terminal_index: u32,
    pub terminal_reason: AbsentReason,
}

/// Run the walk to completion.
///
/// Creates the output directory first. Fails with
/// [`PipelineError::NoResources`] if index 1 is absent.
pub async fn fetch_all<S: ResourceSource>(
    source: &S,
    layout: &OutputLayout,
    progress: Option<&ProgressCallback>,
) -> Result<FetchReport, PipelineError> {
    tokio::fs::create_dir_all(layout.dir())
        .await
        .map_err(|source| PipelineError::OutputDirFailed {
            path: layout.dir().to_path_buf(),
            source,
        })?;

    info!("Fetching resources from {}", source.describe());
    let mut walk = ResourceWalk::new(source, layout).with_progress(progress);
    let mut resources = Vec::new();
    while let Some(resource) = walk.next_resource().await? {
        resources.push(resource);
    }

    let terminal_reason = walk
        .terminal()
        .cloned()
        .ok_or_else(|| PipelineError::Internal("walk ended without a terminal index".into()))?;

    if resources.is_empty() {
        return Err(PipelineError::NoResources {
            url: source.describe(),
            reason: terminal_reason.to_string(),
        });
    }

    info!("Secured {} resources", resources.len());
    Ok(FetchReport {
        terminal_index: walk.next_index(),
        resources,
        terminal_reason,
    })
}
