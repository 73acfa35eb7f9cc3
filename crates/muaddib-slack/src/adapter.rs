use std::sync::Arc;
use std::time::Duration;

use slack_morphism::prelude::*;
use tracing::{error, info};

use muaddib_core::config::SlackConfig;

use crate::context::SlackAppContext;
use crate::error::SlackError;
use crate::handler::on_push_event;

/// Slack channel adapter, driven over Socket Mode (no public HTTP endpoint
/// needed). Reconnects with a fixed backoff whenever the session drops.
pub struct SlackAdapter {
    ctx: Arc<SlackAppContext>,
    config: SlackConfig,
}

impl SlackAdapter {
    pub fn new(config: &SlackConfig, ctx: Arc<SlackAppContext>) -> Self {
        Self { ctx, config: config.clone() }
    }

    /// Connect over Socket Mode and keep reconnecting on failure.
    ///
    /// Never returns — runs for the lifetime of the process.
    pub async fn run(self) {
        loop {
            if let Err(e) = self.connect_and_listen().await {
                error!("Slack: session error ({e}), reconnecting in 15s");
            } else {
                info!("Slack: socket-mode listener stopped cleanly, reconnecting in 15s");
            }
            tokio::time::sleep(Duration::from_secs(15)).await;
        }
    }

    async fn connect_and_listen(&self) -> Result<(), SlackError> {
        let connector = SlackClientHyperConnector::new().map_err(|e| SlackError::Client(e.to_string()))?;
        let client = Arc::new(SlackClient::new(connector));

        let bot_token = SlackApiToken::new(SlackApiTokenValue(self.config.bot_token.clone()));
        let app_token = SlackApiToken::new(SlackApiTokenValue(self.config.app_token.clone()));

        let app = Arc::clone(&self.ctx);
        let push_client = Arc::clone(&client);
        let push_bot_token = bot_token.clone();

        let callbacks = SlackSocketModeListenerCallbacks::new().with_push_events(
            move |event: SlackPushEventCallback, client: Arc<SlackHyperClient>, _states| {
                let app = Arc::clone(&app);
                let bot_token = push_bot_token.clone();
                async move {
                    on_push_event(event, client, app, bot_token).await;
                    Ok(())
                }
            },
        );

        let listener_environment =
            Arc::new(SlackClientEventsListenerEnvironment::new(Arc::clone(&push_client)));

        let listener =
            SlackClientSocketModeListener::new(&SlackClientSocketModeConfig::new(), listener_environment, callbacks);

        listener
            .listen_for(&app_token)
            .await
            .map_err(|e| SlackError::Client(e.to_string()))?;

        listener.serve().await;
        Ok(())
    }
}
