//! Shared state the socket-mode callbacks need for every event: the wired-up
//! message pipeline and the bot's own display name.

use std::sync::Arc;

use muaddib_agent::MessageHandler;

pub struct SlackAppContext {
    pub handler: Arc<MessageHandler>,
    pub mynick: String,
}
