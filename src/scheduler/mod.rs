//! Bounded-concurrency task scheduling.
//!
//! This module provides the core pipeline infrastructure:
//!
//! - **TaskQueue**: closable in-memory queue with safe multi-consumer dequeue
//! - **WorkerPool**: fixed pool of workers that drain the queue concurrently
//! - **RetryPolicy**: per-task retry discipline (unbounded by default)
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │   Producer   │
//!                      │ (input lists)│
//!                      └──────┬───────┘
//!                             │ push all, then close
//!                      ┌──────▼───────┐
//!                      │  Task Queue  │
//!                      └──────┬───────┘
//!                             │
//!         ┌───────────────────┼───────────────────┐
//!         │                   │                   │
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 1│         │ Worker 2│   ...   │ Worker N│
//!    └────┬────┘         └────┬────┘         └────┬────┘
//!         │                   │                   │
//!         └───────────────────┼───────────────────┘
//!                             ▼
//!                      ┌──────────────┐
//!                      │ Result Store │
//!                      └──────────────┘
//! ```
//!
//! Dispatch order is unspecified beyond "each task claimed exactly once";
//! append order in the result store is completion order.

pub mod queue;
pub mod task;
pub mod worker_pool;

// Re-export main types for convenience
pub use queue::{QueueError, TaskProducer, TaskQueue};
pub use task::Task;
pub use worker_pool::{
    DeadLetter, PoolError, PoolStats, RetryPolicy, WorkerPool, WorkerPoolConfig, DEFAULT_WORKERS,
};
