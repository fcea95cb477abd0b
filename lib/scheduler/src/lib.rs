//! The scheduling core of the miniflow execution engine.
//!
//! Two long-lived handler loops drive every execution:
//!
//! - the **input handler** polls for ready work-items, resolves their
//!   parameters into self-contained task payloads and submits them to the
//!   worker engine queue;
//! - the **output handler** polls the queue for finished results, persists
//!   them, unlocks downstream nodes and finalizes executions.
//!
//! Both loops poll adaptively (backing off when idle, tightening under
//! load), fan per-item work out to a bounded worker pool, and shut down
//! cooperatively. The worker engine itself is external; the engine only
//! talks to it through the [`WorkerQueue`] contract.

pub mod config;
pub mod handler;
pub mod input_handler;
pub mod nats;
pub mod output_handler;
pub mod polling;
pub mod queue;
pub mod service;

pub use config::{InputHandlerConfig, OutputHandlerConfig};
pub use handler::HandlerHandle;
pub use input_handler::InputHandler;
pub use nats::{NatsWorkerQueue, QueueTopology};
pub use output_handler::OutputHandler;
pub use polling::AdaptivePolling;
pub use queue::{
    ExecutionResult, InMemoryWorkerQueue, QueueError, ResultPayload, TaskPayload, WorkerQueue,
};
pub use service::input::{InputScheduler, PgInputScheduler};
pub use service::output::{OutputScheduler, PgOutputScheduler, ProcessOutcome};
