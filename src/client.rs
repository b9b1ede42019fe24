//! Telnet client for the Reverse Beacon Network.
//!
//! [`Handshake`] drives the login sequence on an established stream.
//! [`FeedClient`] owns the connection lifecycle: connect, log in, hand each
//! line to a [`FeedHandler`], and reconnect after any failure.

use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default RBN telnet server for CW/RTTY spots.
pub const RBN_HOST: &str = "telnet.reversebeacon.net";

/// Default port for CW/RTTY spots.
pub const RBN_PORT_CW: u16 = 7000;

/// Prompt the server sends before login.
pub const LOGIN_PROMPT: &[u8] = b"Please enter your call: ";

/// Marker in the post-login banner.
pub const WELCOME_MARKER: &str = "Local users";

/// Login progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingPrompt,
    Authenticating,
    AwaitingWelcome,
    Streaming,
    Failed,
}

/// Errors that end a login attempt.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Timed out waiting for the login prompt")]
    PromptTimeout,

    #[error("Timed out waiting for the welcome banner")]
    WelcomeTimeout,

    #[error("Timed out waiting for the call sign echo")]
    EchoTimeout,

    #[error("Connection closed during login")]
    Closed,

    #[error("I/O error during login: {0}")]
    Io(#[from] std::io::Error),
}

/// The login state machine for one connection.
#[derive(Debug)]
pub struct Handshake<'a> {
    callsign: &'a str,
    prompt_timeout: Duration,
    welcome_timeout: Duration,
    state: SessionState,
}

impl<'a> Handshake<'a> {
    pub fn new(callsign: &'a str, prompt_timeout: Duration, welcome_timeout: Duration) -> Self {
        Self {
            callsign,
            prompt_timeout,
            welcome_timeout,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Log in over an established stream.
    ///
    /// Ends in `Streaming` on success and `Failed` on any error.
    pub async fn run<R, W>(&mut self, reader: &mut R, writer: &mut W) -> Result<(), HandshakeError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = self.drive(reader, writer).await;
        if result.is_err() {
            self.state = SessionState::Failed;
        }
        result
    }

    async fn drive<R, W>(&mut self, reader: &mut R, writer: &mut W) -> Result<(), HandshakeError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.state = SessionState::AwaitingPrompt;
        timeout(self.prompt_timeout, read_until_sequence(reader, LOGIN_PROMPT))
            .await
            .map_err(|_| HandshakeError::PromptTimeout)??;

        self.state = SessionState::Authenticating;
        info!("Sending callsign: {}", self.callsign);
        writer
            .write_all(format!("{}\n", self.callsign).as_bytes())
            .await?;
        writer.flush().await?;

        self.state = SessionState::AwaitingWelcome;
        timeout(
            self.welcome_timeout,
            skip_lines_until(reader, |line| line.contains(WELCOME_MARKER)),
        )
        .await
        .map_err(|_| HandshakeError::WelcomeTimeout)??;
        info!("Connection established");

        let callsign = self.callsign;
        timeout(
            self.welcome_timeout,
            skip_lines_until(reader, |line| line.starts_with(callsign)),
        )
        .await
        .map_err(|_| HandshakeError::EchoTimeout)??;

        self.state = SessionState::Streaming;
        info!("Receiving RBN data");
        Ok(())
    }
}

/// Read bytes until `sequence` has been seen. The prompt has no line ending.
async fn read_until_sequence<R>(reader: &mut R, sequence: &[u8]) -> Result<(), HandshakeError>
where
    R: AsyncBufRead + Unpin,
{
    let last = sequence[sequence.len() - 1];
    let mut seen = Vec::with_capacity(256);
    loop {
        let n = reader.read_until(last, &mut seen).await?;
        if n == 0 {
            return Err(HandshakeError::Closed);
        }
        if seen.ends_with(sequence) {
            return Ok(());
        }
    }
}

/// Discard whole lines until one matches.
async fn skip_lines_until<R, F>(reader: &mut R, matches: F) -> Result<(), HandshakeError>
where
    R: AsyncBufRead + Unpin,
    F: Fn(&str) -> bool,
{
    let mut buf = Vec::with_capacity(256);
    loop {
        let line = read_feed_line(reader, &mut buf)
            .await?
            .ok_or(HandshakeError::Closed)?;
        debug!("Login: {}", line);
        if matches(&line) {
            return Ok(());
        }
    }
}

/// Read one line without its line ending. `None` at end of stream.
///
/// Invalid UTF-8 is replaced rather than treated as an error.
pub async fn read_feed_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Hostname of the RBN server.
    pub host: String,

    /// Port number.
    pub port: u16,

    /// Callsign to use for login.
    pub callsign: String,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// How long to wait for the login prompt.
    pub prompt_timeout: Duration,

    /// How long to wait for the welcome banner and the call sign echo.
    pub welcome_timeout: Duration,

    /// Read timeout for individual lines once streaming.
    pub read_timeout: Duration,

    /// Whether to automatically reconnect on disconnect.
    pub auto_reconnect: bool,

    /// Delay between reconnection attempts.
    pub reconnect_delay: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            host: RBN_HOST.to_string(),
            port: RBN_PORT_CW,
            callsign: "N0CALL".to_string(),
            connect_timeout: Duration::from_secs(10),
            prompt_timeout: Duration::from_secs(30),
            welcome_timeout: Duration::from_secs(20),
            read_timeout: Duration::from_secs(300),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl FeedConfig {
    /// Create a new configuration with the given callsign.
    pub fn with_callsign(callsign: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            ..Default::default()
        }
    }

    /// Set the host and port.
    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }
}

/// Events from the feed client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// TCP connection established; login is starting.
    Connected,

    /// Login finished; spot lines follow.
    Streaming,

    /// A line was received after login.
    Line(String),

    /// Connection was lost or login failed.
    Disconnected(String),
}

/// Consumer of feed events. Each event is handled to completion before the
/// next line is read.
pub trait FeedHandler {
    fn handle(&mut self, event: FeedEvent) -> impl Future<Output = ()>;
}

/// RBN telnet client with unbounded reconnect.
pub struct FeedClient {
    config: FeedConfig,
}

impl FeedClient {
    /// Create a new feed client with the given configuration.
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Connect, log in and stream lines into `handler`, reconnecting after
    /// every failure.
    ///
    /// Returns only when `auto_reconnect` is off and the session has ended.
    /// Dropping the returned future closes the connection.
    pub async fn run<H: FeedHandler>(&self, handler: &mut H) {
        loop {
            let reason = match self.connect_and_stream(handler).await {
                Ok(()) => "connection closed by server".to_string(),
                Err(e) => format!("{:#}", e),
            };
            warn!("Disconnected: {}", reason);
            handler.handle(FeedEvent::Disconnected(reason)).await;

            if !self.config.auto_reconnect {
                break;
            }

            info!(
                "Reconnecting in {} seconds...",
                self.config.reconnect_delay.as_secs()
            );
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    /// Connect to the server and stream lines until disconnected.
    async fn connect_and_stream<H: FeedHandler>(&self, handler: &mut H) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("Connecting to {}...", addr);

        let stream = timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .context("Connection timeout")?
            .context("Failed to connect")?;

        info!("Connected to {}", addr);
        handler.handle(FeedEvent::Connected).await;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let mut handshake = Handshake::new(
            &self.config.callsign,
            self.config.prompt_timeout,
            self.config.welcome_timeout,
        );
        handshake
            .run(&mut reader, &mut writer)
            .await
            .context("Login failed")?;
        handler.handle(FeedEvent::Streaming).await;

        let mut buf = Vec::with_capacity(256);
        loop {
            let line = timeout(self.config.read_timeout, read_feed_line(&mut reader, &mut buf))
                .await
                .context("Read timeout, connection may be stale")?
                .context("Read error")?;

            match line {
                Some(line) => {
                    debug!("Received: {}", line);
                    handler.handle(FeedEvent::Line(line)).await;
                }
                None => return Ok(()),
            }
        }
    }
}
