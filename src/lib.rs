//! convosync - conversation data-synchronization core
//!
//! This library reconciles an in-process cache, a durable store, and remote
//! completion providers for chat conversations, messages, and token-usage
//! telemetry. Intents enter as typed actions, are routed to exactly one
//! orchestrator, and produce exactly one typed result on a broadcast
//! channel per action.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `actions`: typed actions and results crossing the presentation boundary
//! - `dispatch`: the action router and its per-category broadcast channels
//! - `cache`: the serialized conversation cache and the bounded LRU
//! - `storage`: the durable-store trait with SQLite and in-memory backends
//! - `providers`: completion services, the model catalog, and the registry
//! - `orchestrator`: cache-aside coordination per functional area
//! - `timeline`: timeline items, the merge algorithm, and per-conversation state
//! - `settings`: the key-validated user settings store
//! - `engine`: explicit wiring and task spawning
//! - `config`: configuration management
//! - `error`: error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use convosync::{Config, SyncEngine};
//! use convosync::actions::{Action, ConversationAction};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let engine = SyncEngine::with_defaults(config)?;
//!     let mut results = engine.router().subscribe_conversation_updates();
//!     let _tasks = engine.spawn();
//!
//!     engine.dispatch(Action::Conversation(ConversationAction::List));
//!     let update = results.recv().await?;
//!     println!("{update:?}");
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod settings;
pub mod storage;
pub mod timeline;

// Re-export commonly used types
pub use cache::{BoundedLruCache, ConversationCache};
pub use config::Config;
pub use dispatch::ActionRouter;
pub use engine::SyncEngine;
pub use error::{ConvosyncError, Result};
pub use providers::{CompletionService, ProviderModel, ServiceRegistry};
pub use storage::{DurableStore, MemoryStore, SqliteStorage};
pub use timeline::{ChatTimeline, TimelineItem};
