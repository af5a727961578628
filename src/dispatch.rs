//! Action routing
//!
//! The router is the single point where inbound intents and outbound
//! results change hands. Each action category gets its own typed broadcast
//! channel; orchestrators subscribe to the get channels, presentation code
//! subscribes to the update channels, and nobody calls anybody directly.

use crate::actions::{
    Action, ChatAction, ChatUpdate, ConversationAction, ConversationUpdate, SettingsAction,
    SettingsUpdate, UsageAction, UsageUpdate,
};
use tokio::sync::broadcast;

/// Fans each action out on exactly one typed broadcast channel
///
/// Cloning the router clones the senders; all clones feed the same
/// subscribers. Sends with no live receiver are dropped silently, matching
/// broadcast semantics — an orchestrator that has not been spawned simply
/// sees nothing.
#[derive(Clone)]
pub struct ActionRouter {
    chat_tx: broadcast::Sender<ChatAction>,
    chat_update_tx: broadcast::Sender<ChatUpdate>,
    conversation_tx: broadcast::Sender<ConversationAction>,
    conversation_update_tx: broadcast::Sender<ConversationUpdate>,
    usage_tx: broadcast::Sender<UsageAction>,
    usage_update_tx: broadcast::Sender<UsageUpdate>,
    settings_tx: broadcast::Sender<SettingsAction>,
    settings_update_tx: broadcast::Sender<SettingsUpdate>,
}

impl ActionRouter {
    /// Create a router whose channels buffer `capacity` pending items each
    pub fn new(capacity: usize) -> Self {
        let (chat_tx, _) = broadcast::channel(capacity);
        let (chat_update_tx, _) = broadcast::channel(capacity);
        let (conversation_tx, _) = broadcast::channel(capacity);
        let (conversation_update_tx, _) = broadcast::channel(capacity);
        let (usage_tx, _) = broadcast::channel(capacity);
        let (usage_update_tx, _) = broadcast::channel(capacity);
        let (settings_tx, _) = broadcast::channel(capacity);
        let (settings_update_tx, _) = broadcast::channel(capacity);
        Self {
            chat_tx,
            chat_update_tx,
            conversation_tx,
            conversation_update_tx,
            usage_tx,
            usage_update_tx,
            settings_tx,
            settings_update_tx,
        }
    }

    /// Republishes the action on the channel of its category
    pub fn dispatch(&self, action: Action) {
        match action {
            Action::Chat(action) => {
                let _ = self.chat_tx.send(action);
            }
            Action::ChatUpdate(update) => {
                let _ = self.chat_update_tx.send(update);
            }
            Action::Conversation(action) => {
                let _ = self.conversation_tx.send(action);
            }
            Action::ConversationUpdate(update) => {
                let _ = self.conversation_update_tx.send(update);
            }
            Action::Usage(action) => {
                let _ = self.usage_tx.send(action);
            }
            Action::UsageUpdate(update) => {
                let _ = self.usage_update_tx.send(update);
            }
            Action::Settings(action) => {
                let _ = self.settings_tx.send(action);
            }
            Action::SettingsUpdate(update) => {
                let _ = self.settings_update_tx.send(update);
            }
        }
    }

    /// Subscribe to chat-get actions (message orchestrator side)
    pub fn subscribe_chat(&self) -> broadcast::Receiver<ChatAction> {
        self.chat_tx.subscribe()
    }

    /// Subscribe to chat results
    pub fn subscribe_chat_updates(&self) -> broadcast::Receiver<ChatUpdate> {
        self.chat_update_tx.subscribe()
    }

    /// Subscribe to conversation-get actions
    pub fn subscribe_conversations(&self) -> broadcast::Receiver<ConversationAction> {
        self.conversation_tx.subscribe()
    }

    /// Subscribe to conversation-list results
    pub fn subscribe_conversation_updates(&self) -> broadcast::Receiver<ConversationUpdate> {
        self.conversation_update_tx.subscribe()
    }

    /// Subscribe to usage-get actions
    pub fn subscribe_usage(&self) -> broadcast::Receiver<UsageAction> {
        self.usage_tx.subscribe()
    }

    /// Subscribe to usage results
    pub fn subscribe_usage_updates(&self) -> broadcast::Receiver<UsageUpdate> {
        self.usage_update_tx.subscribe()
    }

    /// Subscribe to settings-get actions
    pub fn subscribe_settings(&self) -> broadcast::Receiver<SettingsAction> {
        self.settings_tx.subscribe()
    }

    /// Subscribe to settings results
    pub fn subscribe_settings_updates(&self) -> broadcast::Receiver<SettingsUpdate> {
        self.settings_update_tx.subscribe()
    }
}

impl Default for ActionRouter {
    fn default() -> Self {
        Self::new(64)
    }
}
