//! Shared, reconnect-safe state the event handler needs for every message:
//! the wired-up message pipeline and the bot's own display name (used for
//! mention stripping and the `mynick` field on every `RoomMessage`).

use std::sync::Arc;

use muaddib_agent::MessageHandler;

pub struct DiscordAppContext {
    pub handler: Arc<MessageHandler>,
    pub mynick: String,
}
