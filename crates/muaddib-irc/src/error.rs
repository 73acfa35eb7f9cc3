/// Errors produced by the IRC adapter.
#[derive(Debug, thiserror::Error)]
pub enum IrcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("malformed line: {0}")]
    Malformed(String),
}
