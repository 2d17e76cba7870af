// Request-scoped execution context

use crate::core::config::LoggingConfig;
use crate::core::error::UserError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Execution context carried by every directory call
///
/// Holds the caller's cancellation token, an optional deadline and the
/// distributed-trace identifier that log records are tagged with.
#[derive(Debug, Clone)]
pub struct RequestContext {
    trace: Option<String>,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            trace: None,
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Attach the trace from a `TRACE_ID/SPAN_ID;o=1` style header
    ///
    /// With a project id the trace is expanded to
    /// `projects/<project>/traces/<TRACE_ID>`, the form log collectors
    /// correlate on. Malformed headers are ignored.
    pub fn with_trace_header(self, header: &str, project: Option<&str>) -> Self {
        match parse_trace_header(header) {
            Some(trace_id) => match project {
                Some(project) => self.with_trace(format!("projects/{}/traces/{}", project, trace_id)),
                None => self.with_trace(trace_id),
            },
            None => self,
        }
    }

    /// Context for an incoming request carrying a trace header, qualified
    /// with the configured `logging.trace_project`
    pub fn from_trace_header(header: &str, logging: &LoggingConfig) -> Self {
        Self::new().with_trace_header(header, logging.trace_project.as_deref())
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Fail fast if the caller has gone away or the deadline has passed
    pub fn ensure_active(&self) -> Result<(), UserError> {
        if self.cancellation.is_cancelled() {
            return Err(UserError::internal(anyhow::anyhow!("request cancelled")));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(UserError::internal(anyhow::anyhow!("deadline exceeded")));
            }
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context is cancelled or expires first
    pub async fn run<F, T>(&self, fut: F) -> Result<T, UserError>
    where
        F: Future<Output = Result<T, UserError>>,
    {
        self.ensure_active()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                Err(UserError::internal(anyhow::anyhow!("request cancelled")))
            }
            _ = deadline => {
                Err(UserError::internal(anyhow::anyhow!("deadline exceeded")))
            }
            result = fut => result,
        }
    }

    /// Span for one directory operation, tagged with the trace when present
    pub fn span(&self, operation: &'static str) -> Span {
        match &self.trace {
            Some(trace) => tracing::info_span!("request", operation, trace = trace.as_str()),
            None => tracing::info_span!("request", operation),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_trace_header(header: &str) -> Option<&str> {
    let trace_id = header.split(['/', ';']).next()?.trim();
    if trace_id.is_empty() || !trace_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(trace_id)
}
