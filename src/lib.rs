//! # CrimeGuard
//!
//! An emergency dispatch backend: classifies inbound chat messages with a
//! hybrid neuro-symbolic pipeline and, when a message describes a severe
//! emergency, places concurrent voice calls to the right services, tracks
//! each call's lifecycle, and allows cancellation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌────────────┐   ┌──────────┐   ┌────────────┐
//! │ Triage  │──▶│ Classifier │──▶│ Decision │──▶│ Dispatcher │
//! │ (free)  │   │ (LLM, 5s)  │   │ (pure)   │   │ (fan-out)  │
//! └─────────┘   └────────────┘   └──────────┘   └─────┬──────┘
//!                                                     │
//!                            ┌────────────────────────┤
//!                            ▼                        ▼
//!                      ┌──────────┐            ┌──────────────┐
//!                      │ Registry │◀───────────│  Telephony    │
//!                      │ (truth)  │  webhooks/ │  provider     │
//!                      └────┬─────┘  polling   └──────────────┘
//!                           │
//!                           ▼
//!                  cancel / status / listing
//! ```
//!
//! A message may imply several services at once (fire + ambulance); each
//! accepted intent becomes an independent call with its own state machine
//! in the registry. Calls are placed concurrently and the batch joins on
//! all of them, so no intent is ever silently dropped.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error taxonomy |
//! | [`triage`] | Free reactive pre-filter |
//! | [`classifier`] | Classification provider abstraction |
//! | [`decision`] | Pure judgment → intents gate |
//! | [`audio`] | Speech synthesis and asset resolution |
//! | [`telephony`] | Telephony provider abstraction + TwiML |
//! | [`registry`] | Call registry (single source of truth) |
//! | [`dispatch`] | Concurrent batch dispatch |
//! | [`monitor`] | Per-call status poller |
//! | [`cancel`] | Cancellation & status service |
//! | [`pipeline`] | End-to-end message handling |
//! | [`server`] | HTTP API |

pub mod audio;
pub mod cancel;
pub mod classifier;
pub mod config;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod monitor;
pub mod pipeline;
pub mod registry;
pub mod server;
pub mod telephony;
pub mod triage;
