//! Settings orchestration
//!
//! Routes settings reads and writes through the settings store and
//! publishes the value (or the failure) on the settings-mutate channel.

use crate::actions::{Action, SettingsAction, SettingsUpdate};
use crate::dispatch::ActionRouter;
use crate::settings::SettingsStore;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinates the settings store with the action surface
pub struct SettingsOrchestrator {
    router: ActionRouter,
    store: Arc<SettingsStore>,
}

impl SettingsOrchestrator {
    pub fn new(router: ActionRouter, store: Arc<SettingsStore>) -> Self {
        Self { router, store }
    }

    /// Consume settings actions until the channel closes
    pub async fn run(self, mut actions: broadcast::Receiver<SettingsAction>) {
        loop {
            match actions.recv().await {
                Ok(action) => self.handle(action),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("settings action subscriber lagged, skipped {skipped}");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Handle a single settings action
    pub fn handle(&self, action: SettingsAction) {
        match action {
            SettingsAction::Get { key } => {
                let update = match self.store.get(&key) {
                    Ok(value) => SettingsUpdate::Value {
                        key,
                        value,
                        error: None,
                    },
                    Err(e) => SettingsUpdate::Value {
                        key,
                        value: None,
                        error: Some(e.to_string()),
                    },
                };
                self.router.dispatch(Action::SettingsUpdate(update));
            }
            SettingsAction::Update { key, value } => {
                let update = match self.store.set(&key, value.clone()) {
                    Ok(()) => SettingsUpdate::Value {
                        key,
                        value: Some(value),
                        error: None,
                    },
                    Err(e) => SettingsUpdate::Value {
                        key,
                        value: None,
                        error: Some(e.to_string()),
                    },
                };
                self.router.dispatch(Action::SettingsUpdate(update));
            }
        }
    }
}
