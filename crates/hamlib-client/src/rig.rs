//! rigctld client
//!
//! One socket per endpoint; uplink and downlink are independent clients.
//! The connection is primed with a frequency query at connect time, so
//! every command starts by consuming the pending reply of its
//! predecessor: the daemon never sees more than one uncommitted command.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::{await_line, connect_socket, send_command, HamlibError, LineBuffer, Result};

/// Pause before a VFO selection, to avoid racing the daemon's VFO
/// switchover.
const VFO_COMMAND_DELAY: Duration = Duration::from_micros(100);

pub struct RigClient {
    host: String,
    port: u16,
    vfo_name: String,
    stream: Option<TcpStream>,
    buffer: LineBuffer,
}

impl RigClient {
    /// A client in the DISCONNECTED state. Frequency commands are
    /// silently dropped until [`RigClient::reconnect`] succeeds. Used
    /// when no rig daemon is configured for this endpoint.
    pub fn disconnected() -> Self {
        Self {
            host: String::new(),
            port: 0,
            vfo_name: String::new(),
            stream: None,
            buffer: LineBuffer::new(),
        }
    }

    /// Connect eagerly and prime the reply pipeline with a frequency
    /// query.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let mut client = Self {
            host: host.to_string(),
            port,
            vfo_name: String::new(),
            stream: None,
            buffer: LineBuffer::new(),
        };
        client.reconnect().await?;
        Ok(client)
    }

    /// (Re-)establish the connection and re-prime the pipeline.
    pub async fn reconnect(&mut self) -> Result<()> {
        let stream = connect_socket(&self.host, self.port).await?;
        send_command(&stream, "f\n")?;
        self.stream = Some(stream);
        self.buffer = LineBuffer::new();
        info!("connected to rigctld at {}:{}", self.host, self.port);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// VFO selected before each frequency command; empty means none.
    pub fn vfo_name(&self) -> &str {
        &self.vfo_name
    }

    pub fn set_vfo(&mut self, vfo_name: impl Into<String>) {
        self.vfo_name = vfo_name.into();
    }

    fn drop_connection(&mut self) {
        if self.stream.take().is_some() {
            debug!("rigctld endpoint at {}:{} disconnected", self.host, self.port);
        }
    }

    fn transport_failure(&mut self, error: HamlibError) -> HamlibError {
        self.drop_connection();
        error
    }

    /// Select the configured VFO, consuming the daemon's acknowledgment.
    /// No-op for an empty VFO name.
    async fn send_vfo_command(stream: &TcpStream, buffer: &mut LineBuffer, vfo: &str) -> Result<()> {
        if vfo.is_empty() {
            return Ok(());
        }
        tokio::time::sleep(VFO_COMMAND_DELAY).await;
        send_command(stream, &format!("V {}\n", vfo))?;
        await_line(stream, buffer).await?;
        Ok(())
    }

    /// Tune the rig to `frequency_mhz`. Silently dropped while
    /// disconnected.
    pub async fn set_frequency(&mut self, frequency_mhz: f64) -> Result<()> {
        let Some(stream) = &self.stream else {
            return Ok(());
        };

        let result: Result<()> = async {
            // reply of the previous command gates this one
            await_line(stream, &mut self.buffer).await?;
            Self::send_vfo_command(stream, &mut self.buffer, &self.vfo_name).await?;
            send_command(stream, &format!("F {:.0}\n", frequency_mhz * 1.0e6))
        }
        .await;

        result.map_err(|e| self.transport_failure(e))
    }

    /// Read the rig's current frequency in MHz, immediately queueing the
    /// next query so a reply is always pending.
    pub async fn read_frequency(&mut self) -> Result<f64> {
        let Some(stream) = &self.stream else {
            return Err(HamlibError::ConnectionClosed);
        };

        let result: Result<f64> = async {
            await_line(stream, &mut self.buffer).await?;
            Self::send_vfo_command(stream, &mut self.buffer, &self.vfo_name).await?;

            send_command(stream, "f\n")?;
            let reply = await_line(stream, &mut self.buffer).await?;
            let frequency_hz: f64 = reply
                .trim()
                .parse()
                .map_err(|_| HamlibError::MalformedReply(reply.clone()))?;

            // re-prime the pipeline
            send_command(stream, "f\n")?;
            Ok(frequency_hz / 1.0e6)
        }
        .await;

        result.map_err(|e| self.transport_failure(e))
    }

    /// Tell the daemon goodbye and drop the socket.
    pub fn disconnect(&mut self) {
        if let Some(stream) = &self.stream {
            let _ = send_command(stream, "q\n");
        }
        self.drop_connection();
    }
}
