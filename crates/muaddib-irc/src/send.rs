use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::IrcError;

/// The write half of the connection, shared between the read loop (which
/// needs to answer PINGs and send the registration burst) and every
/// in-flight reply sender.
pub struct IrcWriter {
    inner: Mutex<Box<dyn AsyncWrite + Unpin + Send>>,
}

impl IrcWriter {
    pub fn new(inner: Box<dyn AsyncWrite + Unpin + Send>) -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(inner) })
    }

    pub async fn write_raw(&self, raw: &str) -> Result<(), IrcError> {
        let mut guard = self.inner.lock().await;
        guard.write_all(raw.as_bytes()).await?;
        guard.flush().await?;
        Ok(())
    }
}
