//! Shared state the read loop needs for every line it parses: the wired-up
//! message pipeline and the bot's own nick (kept current across any server
//! `NICK` collision renames).

use std::sync::Arc;

use muaddib_agent::MessageHandler;
use tokio::sync::RwLock;

pub struct IrcAppContext {
    pub handler: Arc<MessageHandler>,
    pub mynick: RwLock<String>,
}

impl IrcAppContext {
    pub fn new(handler: Arc<MessageHandler>, mynick: String) -> Self {
        Self { handler, mynick: RwLock::new(mynick) }
    }

    pub async fn current_nick(&self) -> String {
        self.mynick.read().await.clone()
    }
}
