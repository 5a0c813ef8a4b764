//! Registry - the decision pipeline and the records it leaves behind
//!
//! Provides:
//! - Content-addressed publication of explanations and participant snapshots
//! - Ledger anchoring of every decision
//! - The current-snapshot pointer with optimistic commits
//! - The pipeline that ties encoder, classifier, attribution and narrator to
//!   the stores above
//! - Read-only queries, an audit trail, configuration and logging setup
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    DecisionPipeline                      │
//! │  encode → classify → attribute → narrate                 │
//! │  → publish explanation → anchor → commit snapshot        │
//! └───────┬──────────────────┬──────────────────┬────────────┘
//!         │                  │                  │
//!         ▼                  ▼                  ▼
//!  ┌─────────────┐   ┌──────────────┐   ┌────────────────┐
//!  │ContentStore │   │ LedgerClient │   │ CurrentPointer │
//!  │ (memory /   │   │ (memory /    │   │ (CAS, journal) │
//!  │ local / IPFS│   │  JSON-RPC)   │   └────────────────┘
//!  └─────────────┘   └──────────────┘
//! ```

pub mod audit;
pub mod bootstrap;
pub mod config;
pub mod content_id;
pub mod document;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod pointer;
pub mod queries;
pub mod store;
pub mod telemetry;

// Re-export main types for convenience
pub use audit::{AuditEntry, AuditLog, AuditStats, DegradedMarker, OrphanedExplanation, RunOutcome};
pub use bootstrap::{bootstrap_genesis, BootstrapError, Registry};
pub use config::{ConfigError, RegistryConfig, TimeoutConfig};
pub use content_id::ContentId;
pub use document::{DatabaseSnapshot, ExplanationRecord, ParticipantEntry, SnapshotMetadata};
pub use error::{FailureKind, PipelineError, Stage};
pub use ledger::{InMemoryLedger, JsonRpcLedger, LedgerAnchor, LedgerClient, LedgerError, TxId};
pub use pipeline::{DecisionOutcome, DecisionPipeline, PipelineParts};
pub use pointer::{CurrentPointer, PointerConflict};
pub use queries::{QueryError, RegistryQueries, RegistryStats, SnapshotView};
pub use store::{
    ContentStore, InMemoryContentStore, LocalContentStore, PinningGatewayStore, StoreError,
};
pub use telemetry::init_tracing;
