//! ELM327-compatible adapter over TCP
//!
//! Commands are ASCII lines terminated by `\r`; the adapter answers with
//! one or more lines and finishes with a `>` prompt.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{DeviceError, ScalarDevice};
use crate::config::Elm327Config;
use crate::obd::{mode, ScalarChannel, ACK_OFFSET};

/// Reset, echo off, linefeeds off, spaces on, headers off, automatic protocol
const INIT_COMMANDS: [&str; 6] = ["ATZ", "ATE0", "ATL0", "ATS1", "ATH0", "ATSP0"];

/// Largest response accepted before the prompt
const MAX_RESPONSE_LEN: usize = 4096;

pub struct Elm327Device {
    address: String,
    timeout: Duration,
    conn: Mutex<Option<TcpStream>>,
}

impl Elm327Device {
    /// Create the device; the connection is opened on first use
    pub fn new(config: &Elm327Config) -> Self {
        Self {
            address: config.address.clone(),
            timeout: config.timeout(),
            conn: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<TcpStream, DeviceError> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| DeviceError::Timeout)?
            .map_err(|e| {
                DeviceError::Transport(format!("Failed to connect to {}: {}", self.address, e))
            })?;

        for command in INIT_COMMANDS {
            let reply = self.command(&mut stream, command).await?;
            debug!(command, reply = %reply.trim(), "ELM327 init");
        }

        info!(address = %self.address, "ELM327 adapter connected");
        Ok(stream)
    }

    /// Send one command and collect the reply up to the prompt
    async fn command(&self, stream: &mut TcpStream, command: &str) -> Result<String, DeviceError> {
        stream
            .write_all(format!("{}\r", command).as_bytes())
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))?;

        tokio::time::timeout(self.timeout, read_until_prompt(stream))
            .await
            .map_err(|_| DeviceError::Timeout)?
    }
}

async fn read_until_prompt(stream: &mut TcpStream) -> Result<String, DeviceError> {
    let mut reply = Vec::new();
    let mut buf = [0u8; 256];

    loop {
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        if n == 0 {
            return Err(DeviceError::Transport("adapter closed the connection".to_string()));
        }

        reply.extend_from_slice(&buf[..n]);
        if let Some(pos) = reply.iter().position(|b| *b == b'>') {
            reply.truncate(pos);
            return Ok(String::from_utf8_lossy(&reply).into_owned());
        }
        if reply.len() > MAX_RESPONSE_LEN {
            return Err(DeviceError::Malformed("reply exceeds maximum length".to_string()));
        }
    }
}

/// Parse an adapter reply to a mode 01 request for `channel`.
///
/// Accepts replies with or without spaces and skips echo and
/// `SEARCHING...` lines.
pub fn parse_mode01_response(reply: &str, channel: ScalarChannel) -> Result<f64, DeviceError> {
    if reply.to_ascii_uppercase().contains("NO DATA") {
        return Err(DeviceError::NoData(channel));
    }

    let expected = [mode::CURRENT_DATA | ACK_OFFSET, channel.pid()];
    for line in reply.split(|c: char| c == '\r' || c == '\n') {
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() || compact.len() % 2 != 0 {
            continue;
        }
        let Ok(bytes) = hex::decode(&compact) else {
            continue;
        };
        if bytes.len() > 2 && bytes[..2] == expected {
            return channel.decode(&bytes[2..]).ok_or_else(|| {
                DeviceError::Malformed(format!("short answer for {}: {}", channel, line.trim()))
            });
        }
    }

    Err(DeviceError::Malformed(format!(
        "no answer for {} in {:?}",
        channel,
        reply.trim()
    )))
}

#[async_trait]
impl ScalarDevice for Elm327Device {
    async fn read(&self, channel: ScalarChannel) -> Result<f64, DeviceError> {
        let mut conn = self.conn.lock().await;
        if conn.is_none() {
            *conn = Some(self.connect().await?);
        }
        let Some(stream) = conn.as_mut() else {
            return Err(DeviceError::Unavailable("adapter not connected".to_string()));
        };

        let command = format!("{:02X}{:02X}", mode::CURRENT_DATA, channel.pid());
        match self.command(stream, &command).await {
            Ok(reply) => parse_mode01_response(&reply, channel),
            Err(e) => {
                warn!(address = %self.address, error = %e, "ELM327 command failed, reconnecting on next read");
                *conn = None;
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "elm327"
    }
}
