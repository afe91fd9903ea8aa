//! Log Content Reader: the tail of one source on one host.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{ContentTarget, RemoteCommand};
use crate::config::Config;
use crate::error::RequestError;
use crate::registry::HostRegistry;
use crate::transport::{execute_bounded, Transport};
use crate::types::{Host, HostFailure, HostId, SourceKind};

/// Reject names that could escape the log directory or break a command line.
pub fn validate_source_name(name: &str) -> Result<(), RequestError> {
    let invalid = name.is_empty()
        || name.contains('/')
        || name.contains("..")
        || name.chars().any(char::is_control);
    if invalid {
        return Err(RequestError::InvalidSourceName(name.to_string()));
    }
    Ok(())
}

/// A tail read request. `lines: None` means the configured default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailRequest {
    pub host_id: HostId,
    pub name: String,
    pub kind: SourceKind,
    pub lines: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogContent {
    pub host_id: HostId,
    pub display_name: String,
    pub name: String,
    pub kind: SourceKind,
    pub lines: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TailError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("{}", .0.error)]
    Host(HostFailure),
}

pub struct ContentReader {
    transport: Arc<dyn Transport>,
    registry: Arc<dyn HostRegistry>,
    log_dir: String,
    default_lines: usize,
    max_lines: usize,
    timeout: Duration,
}

impl ContentReader {
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<dyn HostRegistry>, config: &Config) -> Self {
        Self {
            transport,
            registry,
            log_dir: config.scan.log_dir.clone(),
            default_lines: config.content.default_lines,
            max_lines: config.content.max_lines,
            timeout: config.search.source_timeout(),
        }
    }

    /// Line count actually used: the default when unset, capped at the
    /// configured maximum. Zero is rejected.
    pub fn effective_lines(&self, requested: Option<usize>) -> Result<usize, RequestError> {
        match requested {
            None => Ok(self.default_lines.min(self.max_lines)),
            Some(0) => Err(RequestError::LineCountOutOfRange {
                requested: 0,
                max: self.max_lines,
            }),
            Some(n) => Ok(n.min(self.max_lines)),
        }
    }

    pub async fn read_tail(&self, request: &TailRequest) -> Result<LogContent, TailError> {
        validate_source_name(&request.name)?;
        let lines = self.effective_lines(request.lines)?;

        let host = self
            .registry
            .list_hosts()
            .into_iter()
            .find(|host| host.id == request.host_id)
            .unwrap_or_else(|| Host {
                id: request.host_id.clone(),
                display_name: request.host_id.to_string(),
                connection: None,
            });

        let command = RemoteCommand::ReadTail {
            target: ContentTarget::for_source(&self.log_dir, &request.name, request.kind),
            lines,
        };
        match execute_bounded(self.transport.as_ref(), &host.id, &command, self.timeout).await {
            Ok(output) => Ok(LogContent {
                host_id: host.id,
                display_name: host.display_name,
                name: request.name.clone(),
                kind: request.kind,
                lines,
                content: output.stdout,
            }),
            Err(err) => {
                tracing::warn!(host = %host.id, source = %request.name, error = %err, "tail failed");
                Err(TailError::Host(HostFailure::new(&host, &err)))
            }
        }
    }
}
