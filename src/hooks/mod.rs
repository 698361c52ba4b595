//! Asynchronous lifecycle hooks.
//!
//! Handlers are registered per [`HookEventType`] and run either one after
//! another in registration order or concurrently under a semaphore. Every
//! handler runs in its own task under a timeout, so a panicking or hung
//! handler only fails its own [`HookResult`].

pub mod builtin;

use std::any::Any;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use crate::config::{DispatchMode, HookConfig};
use crate::domain::metadata::now_utc;
use crate::domain::EntityKind;

pub use builtin::install_builtin_hooks;

labeled_enum! {
    pub enum HookEventType as "hook event" {
        PreWrite => "pre_write",
        PostWrite => "post_write",
        WorkCreated => "work_created",
        ScheduleChanged => "schedule_changed",
        WorkCompleted => "work_completed",
        AssociationChanged => "association_changed",
        GroupConsolidated => "group_consolidated",
        UpdateRecorded => "update_recorded",
        CleanupExecuted => "cleanup_executed",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookEvent {
    pub event_type: HookEventType,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub root: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    pub payload: serde_json::Value,
}

impl HookEvent {
    pub fn new(
        event_type: HookEventType,
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        root: &Path,
    ) -> Self {
        Self {
            event_type,
            entity_kind,
            entity_id: entity_id.into(),
            root: root.to_path_buf(),
            occurred_at: now_utc(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn at(mut self, occurred_at: OffsetDateTime) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, event: Arc<HookEvent>) -> Result<(), String>;
}

/// Adapts an async closure into a [`HookHandler`].
pub struct ClosureHandler<F> {
    handle_fn: F,
}

impl<F> ClosureHandler<F> {
    pub fn new(handle_fn: F) -> Self {
        Self { handle_fn }
    }
}

#[async_trait]
impl<F, Fut> HookHandler for ClosureHandler<F>
where
    F: Fn(Arc<HookEvent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    async fn handle(&self, event: Arc<HookEvent>) -> Result<(), String> {
        (self.handle_fn)(event).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookResult {
    pub handler_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl HookResult {
    fn finished(handler_name: String, error: Option<String>, started: Instant) -> Self {
        Self {
            handler_name,
            success: error.is_none(),
            error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookError {
    /// Sequential dispatch stopped at the first failing handler.
    Aborted {
        handler: String,
        results: Vec<HookResult>,
    },
    /// Concurrent dispatch finished with at least one failing handler.
    PartialFailure {
        failed: usize,
        results: Vec<HookResult>,
    },
}

impl HookError {
    pub fn results(&self) -> &[HookResult] {
        match self {
            HookError::Aborted { results, .. } | HookError::PartialFailure { results, .. } => {
                results
            }
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::Aborted { handler, results } => {
                let reason = results
                    .iter()
                    .find(|result| &result.handler_name == handler)
                    .and_then(|result| result.error.as_deref())
                    .unwrap_or("unknown error");
                write!(f, "hook '{}' failed: {}", handler, reason)
            }
            HookError::PartialFailure { failed, results } => {
                write!(f, "{} of {} hooks failed", failed, results.len())
            }
        }
    }
}

impl Error for HookError {}

#[derive(Clone)]
struct Registration {
    name: String,
    handler: Arc<dyn HookHandler>,
}

pub struct HookDispatcher {
    config: HookConfig,
    handlers: HashMap<HookEventType, Vec<Registration>>,
}

impl HookDispatcher {
    pub fn new(config: HookConfig) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn register(
        &mut self,
        event_type: HookEventType,
        name: impl Into<String>,
        handler: Arc<dyn HookHandler>,
    ) {
        let name = name.into();
        debug!(event = %event_type, handler = %name, "hook registered");
        self.handlers
            .entry(event_type)
            .or_default()
            .push(Registration { name, handler });
    }

    pub fn register_fn<F, Fut>(&mut self, event_type: HookEventType, name: impl Into<String>, f: F)
    where
        F: Fn(Arc<HookEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.register(event_type, name, Arc::new(ClosureHandler::new(f)));
    }

    pub fn handler_count(&self, event_type: HookEventType) -> usize {
        self.handlers.get(&event_type).map_or(0, Vec::len)
    }

    pub fn clear(&mut self, event_type: Option<HookEventType>) {
        match event_type {
            Some(event_type) => {
                self.handlers.remove(&event_type);
            }
            None => self.handlers.clear(),
        }
    }

    /// Runs the event through the configured [`DispatchMode`].
    pub async fn dispatch(&self, event: HookEvent) -> Result<Vec<HookResult>, HookError> {
        match self.config.mode {
            DispatchMode::Sequential => self.execute_sync(event).await,
            DispatchMode::Concurrent => self.execute(event).await,
        }
    }

    /// Runs handlers one at a time in registration order.
    pub async fn execute_sync(&self, event: HookEvent) -> Result<Vec<HookResult>, HookError> {
        let Some(registrations) = self.registrations_for(event.event_type) else {
            return Ok(Vec::new());
        };
        let event = Arc::new(event);
        let timeout = self.config.timeout();

        let mut results = Vec::with_capacity(registrations.len());
        for registration in registrations {
            let result = run_handler(
                registration.name.clone(),
                Arc::clone(&registration.handler),
                Arc::clone(&event),
                timeout,
            )
            .await;
            let failed = !result.success;
            results.push(result);
            if failed {
                log_failure(&event, results.last());
                if !self.config.continue_on_error {
                    return Err(HookError::Aborted {
                        handler: registration.name.clone(),
                        results,
                    });
                }
            }
        }
        Ok(results)
    }

    /// Runs all handlers at once, at most `max_concurrency` at a time, and
    /// waits for every one of them. Results come back in registration order.
    pub async fn execute(&self, event: HookEvent) -> Result<Vec<HookResult>, HookError> {
        let Some(registrations) = self.registrations_for(event.event_type) else {
            return Ok(Vec::new());
        };
        let event = Arc::new(event);
        let timeout = self.config.timeout();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel(registrations.len());

        for (index, registration) in registrations.iter().enumerate() {
            let registration = registration.clone();
            let semaphore = Arc::clone(&semaphore);
            let event = Arc::clone(&event);
            let tx = tx.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        run_handler(registration.name, registration.handler, event, timeout).await
                    }
                    Err(_) => HookResult::finished(
                        registration.name,
                        Some("hook semaphore closed".to_string()),
                        started,
                    ),
                };
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<Option<HookResult>> = vec![None; registrations.len()];
        while let Some((index, result)) = rx.recv().await {
            slots[index] = Some(result);
        }

        let results: Vec<HookResult> = slots
            .into_iter()
            .zip(registrations.iter())
            .map(|(slot, registration)| {
                slot.unwrap_or_else(|| HookResult {
                    handler_name: registration.name.clone(),
                    success: false,
                    error: Some("hook task ended without reporting".to_string()),
                    duration_ms: 0,
                })
            })
            .collect();

        let failed = results.iter().filter(|result| !result.success).count();
        for result in results.iter().filter(|result| !result.success) {
            log_failure(&event, Some(result));
        }
        if failed > 0 && !self.config.continue_on_error {
            return Err(HookError::PartialFailure { failed, results });
        }
        Ok(results)
    }

    fn registrations_for(&self, event_type: HookEventType) -> Option<&[Registration]> {
        if !self.config.enabled {
            return None;
        }
        self.handlers
            .get(&event_type)
            .map(Vec::as_slice)
            .filter(|registrations| !registrations.is_empty())
    }
}

async fn run_handler(
    name: String,
    handler: Arc<dyn HookHandler>,
    event: Arc<HookEvent>,
    timeout: Duration,
) -> HookResult {
    let started = Instant::now();
    let task = tokio::spawn(async move { handler.handle(event).await });

    // On timeout the task handle is dropped and the handler keeps running
    // detached; its outcome is ignored.
    let error = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(()))) => None,
        Ok(Ok(Err(message))) => Some(message),
        Ok(Err(join_err)) if join_err.is_panic() => Some(format!(
            "handler panicked: {}",
            panic_message(join_err.into_panic().as_ref())
        )),
        Ok(Err(join_err)) => Some(format!("handler task failed: {}", join_err)),
        Err(_) => Some(format!("handler timed out after {}ms", timeout.as_millis())),
    };
    HookResult::finished(name, error, started)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn log_failure(event: &HookEvent, result: Option<&HookResult>) {
    if let Some(result) = result {
        warn!(
            event = %event.event_type,
            entity = %event.entity_id,
            handler = %result.handler_name,
            error = result.error.as_deref().unwrap_or(""),
            "hook failed"
        );
    }
}
