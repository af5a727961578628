//! Orchestrators
//!
//! Each orchestrator owns one functional area and coordinates the cache,
//! the durable store, and the remote services for it. They subscribe to
//! their action category on the router and publish exactly one typed
//! result per action; no orchestrator calls another directly.

pub mod conversations;
pub mod messages;
pub mod settings;
pub mod usage;

pub use conversations::ConversationOrchestrator;
pub use messages::MessageOrchestrator;
pub use settings::SettingsOrchestrator;
pub use usage::UsageAggregator;
