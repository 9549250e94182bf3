//! SSH transport implementation using russh.

use std::future::Future;
use std::sync::Arc;

use log::{debug, info};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg, Pty};

use super::config::{AuthMethod, SshConfig};
use crate::error::{Result, TransportError};

/// Byte-stream pair of an interactive shell.
///
/// The command framer is written against this seam so it can run against
/// a scripted stream in tests. The concrete implementation is
/// [`ShellChannel`].
pub trait ShellStream: Send {
    /// Write raw bytes to the shell's input.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Read the next chunk of shell output. Blocks until the peer sends
    /// data; a closed channel is a [`TransportError::Disconnected`].
    fn read_chunk(&mut self) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// SSH transport wrapping russh client.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<ProbeHandler>,

    /// Configuration used for this connection.
    config: SshConfig,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let handler = ProbeHandler {
            host: config.host.clone(),
        };

        // Connect to the server
        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(TransportError::Ssh)?;

        // Authenticate
        Self::authenticate(&mut session, &config).await?;

        info!("successfully dialed router: {}", config.host);

        Ok(Self { session, config })
    }

    /// Open the interactive shell channel this transport's commands run on.
    ///
    /// Requests a vt100 PTY with local echo disabled, matching what router
    /// CLIs expect from an automation session.
    pub async fn open_shell(&self) -> Result<ShellChannel> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "vt100",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[
                    (Pty::ECHO, 0),
                    (Pty::TTY_OP_ISPEED, 14400),
                    (Pty::TTY_OP_OSPEED, 14400),
                ],
            )
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(ShellChannel { channel })
    }

    /// Authenticate with the server.
    async fn authenticate(session: &mut Handle<ProbeHandler>, config: &SshConfig) -> Result<()> {
        let success = match &config.auth {
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_deref())
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                // Get the best RSA hash algorithm supported by the server
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// Interactive shell channel over an authenticated SSH session.
pub struct ShellChannel {
    channel: Channel<Msg>,
}

impl ShellStream for ShellChannel {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.channel.data(data).await.map_err(TransportError::Ssh)?;
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(data.to_vec()),
                Some(ChannelMsg::ExtendedData { data, .. }) => return Ok(data.to_vec()),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err(TransportError::Disconnected.into());
                }
                Some(msg) => {
                    debug!("ignoring channel message: {:?}", msg);
                }
            }
        }
    }
}

/// SSH client handler for russh.
///
/// Lab routers are reached by name from a management network; host keys
/// are accepted unconditionally, as the tool has always done.
struct ProbeHandler {
    host: String,
}

impl client::Handler for ProbeHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        debug!("accepting host key for {}", self.host);
        Ok(true)
    }
}
