//! # Reconciliation Engines
//!
//! Declarative reconciliation core for managed virtual-machine resources and
//! their derived catalog entries.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   enqueue/requeue   ┌──────────────────────────┐
//! │   WorkQueue    │────────────────────►│  LifecycleOrchestrator   │
//! │   + Worker     │                     │  (create/update/delete,  │
//! └────────────────┘                     │   attachments, status)   │
//!                                        └─────┬──────────────┬─────┘
//! ┌────────────────┐                           │              │
//! │ CatalogSyncer  │──────┐              ┌─────▼─────┐  ┌─────▼─────┐
//! │ (per source)   │      │              │ Provider  │  │  Object   │
//! └───────┬────────┘      │              │  traits   │  │   Store   │
//!         │          ┌────▼────┐         └───────────┘  └───────────┘
//!         └─────────►│  diff   │
//!                    └─────────┘
//! ```
//!
//! Both engines are synchronous from the caller's perspective: one call is
//! one full pass, holding no background work. Fan-out across distinct
//! resource identities is the [`queue`] worker's job; the engines themselves
//! are safe to invoke concurrently for different identities.
//!
//! ## Crate Organization
//!
//! - [`diff`] - Pure added/removed/updated set computation
//! - [`store`] - Persistence collaborator trait and in-memory implementation
//! - [`catalog`] - Source-owned catalog item convergence
//! - [`lifecycle`] - Managed-resource lifecycle orchestration
//! - [`queue`] - Work queue and concurrency-bounded worker

pub mod catalog;
pub mod diff;
pub mod lifecycle;
pub mod queue;
pub mod store;

pub use catalog::CatalogSyncer;
pub use diff::{diff, DiffItem, DiffKey, DiffResult};
pub use lifecycle::{LifecycleOrchestrator, OrchestratorConfig};
pub use queue::{Reconciler, WorkQueue, Worker, WorkerConfig};
pub use store::{memory::MemoryStore, ObjectStore};
