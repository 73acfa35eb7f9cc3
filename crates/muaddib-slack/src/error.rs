/// Errors produced by the Slack adapter.
#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("slack client error: {0}")]
    Client(String),

    #[error("no bot token configured")]
    NoToken,
}
