use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{error, info, warn};

use muaddib_core::config::IrcConfig;

use crate::context::IrcAppContext;
use crate::error::IrcError;
use crate::handler::on_privmsg;
use crate::proto::{self, parse};
use crate::send::IrcWriter;

/// One IRC network connection, driven by the hand-rolled line protocol in
/// `proto.rs`. Reconnects with a fixed backoff whenever the socket drops,
/// the same shape as the Discord and Slack adapters' reconnect loops.
pub struct IrcAdapter {
    ctx: Arc<IrcAppContext>,
    config: IrcConfig,
}

impl IrcAdapter {
    pub fn new(config: &IrcConfig, ctx: Arc<IrcAppContext>) -> Self {
        Self { ctx, config: config.clone() }
    }

    pub async fn run(self) {
        loop {
            if let Err(e) = self.connect_and_serve().await {
                error!("IRC[{}]: session error ({e}), reconnecting in 10s", self.config.server_tag);
            } else {
                info!("IRC[{}]: connection closed, reconnecting in 10s", self.config.server_tag);
            }
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }

    async fn connect_and_serve(&self) -> Result<(), IrcError> {
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;

        let (read_half, write_half): (
            Box<dyn AsyncRead + Unpin + Send>,
            Box<dyn AsyncWrite + Unpin + Send>,
        ) = if self.config.tls {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots_certs());
            let tls_config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
            let connector = TlsConnector::from(Arc::new(tls_config));
            let server_name = ServerName::try_from(self.config.host.clone())
                .map_err(|e| IrcError::Tls(e.to_string()))?;
            let tls_stream = connector
                .connect(server_name, stream)
                .await
                .map_err(|e| IrcError::Tls(e.to_string()))?;
            let (r, w) = tokio::io::split(tls_stream);
            (Box::new(r), Box::new(w))
        } else {
            let (r, w) = tokio::io::split(stream);
            (Box::new(r), Box::new(w))
        };

        let writer = IrcWriter::new(write_half);

        writer.write_raw(&proto::nick(&self.config.nick)).await?;
        writer.write_raw(&proto::user(&self.config.nick, "muaddib")).await?;

        *self.ctx.mynick.write().await = self.config.nick.clone();

        let mut lines = BufReader::new(read_half).lines();
        let mut joined = false;

        while let Some(raw) = lines.next_line().await? {
            let Some(line) = parse(&raw) else { continue };

            match line.command.as_str() {
                "PING" => {
                    if let Some(token) = line.params.first() {
                        writer.write_raw(&proto::pong(token)).await?;
                    }
                }
                "001" => {
                    // Registration complete. Identify with NickServ before
                    // joining, so our messages in +r channels aren't bounced.
                    if let Some(password) = &self.config.nickserv_password {
                        writer.write_raw(&proto::privmsg_to_nickserv(password)).await?;
                    }
                    if !joined {
                        for channel in &self.config.channels {
                            writer.write_raw(&proto::join(channel)).await?;
                        }
                        joined = true;
                    }
                }
                "433" => {
                    warn!("IRC[{}]: nick already in use, appending underscore", self.config.server_tag);
                    let mut nick = self.ctx.current_nick().await;
                    nick.push('_');
                    writer.write_raw(&proto::nick(&nick)).await?;
                    *self.ctx.mynick.write().await = nick;
                }
                "PRIVMSG" => {
                    on_privmsg(&line, &self.config.server_tag, &self.ctx, &writer).await;
                }
                _ => {}
            }
        }

        Err(IrcError::ConnectionClosed)
    }
}

fn webpki_roots_certs() -> impl Iterator<Item = rustls::pki_types::TrustAnchor<'static>> {
    webpki_roots::TLS_SERVER_ROOTS.iter().cloned()
}
