//! # Core Application Logic
//!
//! This module contains Marquee's concurrency and caching core.
//! It knows nothing about any specific UI technology.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │      AppCoordinator     │
//!                    │ intent in, snapshot out │
//!                    └───────────┬─────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌────────────┐      ┌────────────┐      ┌────────────┐
//!     │ Navigation │      │    Task    │      │   Image    │
//!     │   State    │      │ Dispatcher │      │   Cache    │
//!     │ (1 mutex)  │      │            │      │ (1 mutex)  │
//!     └────────────┘      └─────┬──────┘      └────────────┘
//!                               ▼
//!                        ┌────────────┐      ┌────────────┐
//!                        │   Retry    │─────▶│ Rate Gate  │
//!                        │  Executor  │      │ (1 mutex)  │
//!                        └────────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The `AppCoordinator`, and the single `apply_result` choke point
//! - [`intent`]: The `Intent` enum, everything the user can ask for
//! - [`navigation`]: Screens, payloads and the navigation stack
//! - [`state`]: Shared UI state and the per-frame `Snapshot`
//! - [`dispatcher`]: Background execution with per-kind generations
//! - [`retry`]: Timeouts, validation and backoff around one remote call
//! - [`rate_gate`]: Sliding-window admission control
//! - [`image_cache`]: Bounded LRU for posters
//! - [`config`]: Layered configuration
//! - [`error`]: The error kinds every operation ends in

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod image_cache;
pub mod intent;
pub mod navigation;
pub mod rate_gate;
pub mod retry;
pub mod state;
