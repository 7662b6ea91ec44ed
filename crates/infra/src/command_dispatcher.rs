//! Command/query execution pipeline (the mediator).
//!
//! ```text
//! Command
//!   ↓
//! 1. Begin a store transaction
//!   ↓
//! 2. Validate (field rules + lookups such as code uniqueness)
//!   ↓
//! 3. Handle (load, mutate the aggregate through its mutators, write)
//!   ↓
//! 4. Commit
//!   ↓
//! 5. Publish the drained change events to the bus
//! ```
//!
//! Any error before step 4 drops the transaction, which rolls it back.
//! Publication happens after commit; a publish failure is logged and does
//! not undo the change.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use catalog_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ValidationSummary};
use catalog_events::{Event, EventBus, EventEnvelope};
use catalog_products::Product;

use crate::numbering::NumberingError;
use crate::settings::ProductSettings;
use crate::store::{CatalogStore, CatalogTx, StoreError};

pub const PRODUCT_AGGREGATE_TYPE: &str = "products.product";

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Field-level rejection; nothing was written.
    #[error("validation failed ({} errors)", .0.errors.len())]
    Validation(ValidationSummary),
    /// The addressed entity, or one it references, does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Optimistic concurrency failure (stale product version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    /// Domain invariant failure that is not tied to a request field.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// Event payload could not be serialized for publication.
    #[error("failed to serialize event: {0}")]
    Serialize(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::NotFound => DispatchError::NotFound("entity".to_string()),
            DomainError::InvalidId(msg) => DispatchError::Validation(ValidationSummary::single("id", msg)),
            other => DispatchError::Validation(other.into()),
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { entity, id } => DispatchError::NotFound(format!("{entity} {id}")),
            StoreError::Conflict(msg) => DispatchError::Concurrency(msg),
            StoreError::UniqueViolation(property) => {
                DispatchError::Validation(ValidationSummary::single(property, "must be unique"))
            }
            StoreError::ForeignKey(msg) => DispatchError::NotFound(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<NumberingError> for DispatchError {
    fn from(value: NumberingError) -> Self {
        match value {
            NumberingError::Template(e) => e.into(),
            NumberingError::Store(e) => e.into(),
        }
    }
}

/// Per-dispatch state handed to a command handler.
#[derive(Debug)]
pub struct CommandContext {
    pub settings: Arc<ProductSettings>,
    /// Timestamp of this change set.
    pub now: DateTime<Utc>,
    outbox: Vec<EventEnvelope<JsonValue>>,
}

impl CommandContext {
    pub fn new(settings: Arc<ProductSettings>, now: DateTime<Utc>) -> Self {
        Self {
            settings,
            now,
            outbox: Vec::new(),
        }
    }

    /// Drain the product's recorded events into the outbox. Call after the
    /// product has been written so the envelopes carry the saved version.
    pub fn record(&mut self, product: &mut Product) -> Result<(), DispatchError> {
        let version = product.version();
        let aggregate_id: AggregateId = product.id_typed().into();
        for event in product.take_events() {
            let payload = serde_json::to_value(&event).map_err(|e| DispatchError::Serialize(e.to_string()))?;
            self.outbox.push(EventEnvelope::new(
                Uuid::now_v7(),
                aggregate_id,
                PRODUCT_AGGREGATE_TYPE,
                version,
                event.event_type(),
                payload,
            ));
        }
        Ok(())
    }

    pub fn pending(&self) -> &[EventEnvelope<JsonValue>] {
        &self.outbox
    }
}

/// A state-changing request.
#[async_trait]
pub trait CatalogCommand: Send + Sync {
    const NAME: &'static str;

    type Output: Send;

    /// Field rules and lookups. An empty summary lets the command proceed.
    async fn validate(&self, tx: &mut dyn CatalogTx, ctx: &CommandContext) -> Result<ValidationSummary, DispatchError>;

    async fn handle(&self, tx: &mut dyn CatalogTx, ctx: &mut CommandContext) -> Result<Self::Output, DispatchError>;
}

/// A read-only request.
#[async_trait]
pub trait CatalogQuery: Send + Sync {
    const NAME: &'static str;

    type Output: Send;

    async fn execute(&self, tx: &mut dyn CatalogTx, settings: &ProductSettings) -> Result<Self::Output, DispatchError>;
}

pub struct CommandDispatcher<B> {
    store: Arc<dyn CatalogStore>,
    bus: B,
    settings: Arc<ProductSettings>,
}

impl<B> CommandDispatcher<B> {
    pub fn new(store: Arc<dyn CatalogStore>, bus: B, settings: ProductSettings) -> Self {
        Self {
            store,
            bus,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ProductSettings {
        &self.settings
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> CommandDispatcher<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run a command in one transaction and publish its events after commit.
    pub async fn dispatch<C: CatalogCommand>(&self, command: &C) -> Result<C::Output, DispatchError> {
        let span = info_span!("dispatch", command = C::NAME);
        async {
            let mut tx = self.store.begin().await.inspect_err(log_store_error)?;
            let mut ctx = CommandContext::new(Arc::clone(&self.settings), Utc::now());

            let summary = command.validate(tx.as_mut(), &ctx).await?;
            if !summary.is_valid() {
                warn!(errors = summary.errors.len(), "command rejected by validation");
                return Err(DispatchError::Validation(summary));
            }

            let output = match command.handle(tx.as_mut(), &mut ctx).await {
                Ok(output) => output,
                Err(e) => {
                    match &e {
                        DispatchError::Store(inner) => error!(error = %inner, "command failed in store"),
                        other => warn!(error = %other, "command rejected"),
                    }
                    return Err(e);
                }
            };

            tx.commit().await.inspect_err(log_store_error)?;
            info!(events = ctx.outbox.len(), "command committed");

            for envelope in ctx.outbox {
                let event_type = envelope.event_type().to_string();
                if let Err(e) = self.bus.publish(envelope) {
                    warn!(%event_type, error = ?e, "failed to publish change event");
                }
            }
            Ok(output)
        }
        .instrument(span)
        .await
    }

    /// Run only the validation step; nothing is written.
    pub async fn validate<C: CatalogCommand>(&self, command: &C) -> Result<ValidationSummary, DispatchError> {
        let mut tx = self.store.begin().await.inspect_err(log_store_error)?;
        let ctx = CommandContext::new(Arc::clone(&self.settings), Utc::now());
        command.validate(tx.as_mut(), &ctx).await
    }

    pub async fn query<Q: CatalogQuery>(&self, query: &Q) -> Result<Q::Output, DispatchError> {
        let span = info_span!("query", query = Q::NAME);
        async {
            let mut tx = self.store.begin().await.inspect_err(log_store_error)?;
            query.execute(tx.as_mut(), &self.settings).await
        }
        .instrument(span)
        .await
    }
}

fn log_store_error(e: &StoreError) {
    error!(error = %e, "store unavailable");
}

/// Log every published change event as an audit trail.
///
/// The subscription is drained on a blocking thread until the bus is dropped.
pub fn spawn_audit_log<B>(bus: &B) -> tokio::task::JoinHandle<()>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let sub = bus.subscribe();
    tokio::task::spawn_blocking(move || {
        while let Ok(env) = sub.recv() {
            info!(
                target: "catalog::audit",
                event_id = %env.event_id(),
                aggregate_type = env.aggregate_type(),
                aggregate_id = %env.aggregate_id(),
                aggregate_version = env.aggregate_version(),
                event_type = env.event_type(),
                "change event"
            );
        }
    })
}
