//! Hamlib Daemon Clients
//!
//! TCP clients for the rotctld and rigctld line protocols. Both share the
//! same lifecycle: sockets are opened eagerly, any send/receive failure
//! transitions the endpoint to DISCONNECTED, and commands are silently
//! dropped until the caller reconnects. Replies are collected into
//! per-socket line buffers; partial lines survive across reads, and a
//! reply line exceeding the buffer is a protocol error that disconnects
//! the endpoint.

use thiserror::Error;
use tokio::net::TcpStream;

mod rig;
mod rotator;

pub use rig::RigClient;
pub use rotator::RotatorClient;

/// Default rotctld port.
pub const ROTCTLD_DEFAULT_PORT: u16 = 4533;
/// Default rigctld port.
pub const RIGCTLD_DEFAULT_PORT: u16 = 4532;

/// Per-socket reply buffer size.
pub const LINE_BUFFER_SIZE: usize = 1024;

#[derive(Error, Debug)]
pub enum HamlibError {
    #[error("unable to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        source: std::io::Error,
    },
    #[error("unable to send to daemon or daemon disconnected: {0}")]
    SendFailed(std::io::Error),
    #[error("unable to read from daemon: {0}")]
    ReadFailed(std::io::Error),
    #[error("daemon closed the connection")]
    ConnectionClosed,
    #[error("reply line exceeded the {LINE_BUFFER_SIZE} byte buffer")]
    BufferOverflow,
    #[error("daemon returned status {0}")]
    ReturnedStatusError(i32),
    #[error("malformed reply: {0:?}")]
    MalformedReply(String),
}

pub type Result<T> = std::result::Result<T, HamlibError>;

/// Fixed-size line accumulator. Bytes are appended as they trickle in;
/// complete lines are handed out one at a time and any trailing partial
/// line stays buffered until its newline arrives.
#[derive(Debug)]
pub(crate) struct LineBuffer {
    data: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(LINE_BUFFER_SIZE),
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.data.len() + bytes.len() > LINE_BUFFER_SIZE {
            return Err(HamlibError::BufferOverflow);
        }
        self.data.extend_from_slice(bytes);
        if self.data.len() >= LINE_BUFFER_SIZE && !self.data.contains(&b'\n') {
            return Err(HamlibError::BufferOverflow);
        }
        Ok(())
    }

    /// Pop the first complete line, without its newline. Trailing CR is
    /// trimmed.
    pub fn take_line(&mut self) -> Option<String> {
        let newline = self.data.iter().position(|&b| b == b'\n')?;
        let rest = self.data.split_off(newline + 1);
        let mut line = std::mem::replace(&mut self.data, rest);
        line.truncate(newline);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Drain whatever the socket has ready without blocking. Returns the
    /// number of bytes consumed; zero means nothing was ready.
    pub fn fill_from(&mut self, stream: &TcpStream) -> Result<usize> {
        let mut total = 0;
        let mut chunk = [0u8; LINE_BUFFER_SIZE];
        loop {
            match stream.try_read(&mut chunk) {
                Ok(0) => {
                    if total == 0 {
                        return Err(HamlibError::ConnectionClosed);
                    }
                    return Ok(total);
                }
                Ok(n) => {
                    self.push_bytes(&chunk[..n])?;
                    total += n;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(total),
                Err(e) => return Err(HamlibError::ReadFailed(e)),
            }
        }
    }
}

/// Open a TCP connection to a daemon.
pub(crate) async fn connect_socket(host: &str, port: u16) -> Result<TcpStream> {
    TcpStream::connect((host, port))
        .await
        .map_err(|source| HamlibError::ConnectFailed {
            host: host.to_string(),
            port,
            source,
        })
}

/// Write a full command without blocking. Hamlib commands are far below
/// the socket buffer size, so a short write only happens on a dead
/// connection and is treated as a transport failure.
pub(crate) fn send_command(stream: &TcpStream, command: &str) -> Result<()> {
    match stream.try_write(command.as_bytes()) {
        Ok(n) if n == command.len() => Ok(()),
        Ok(_) => Err(HamlibError::SendFailed(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            "short write",
        ))),
        Err(e) => Err(HamlibError::SendFailed(e)),
    }
}

/// Wait for the next complete reply line.
pub(crate) async fn await_line(stream: &TcpStream, buffer: &mut LineBuffer) -> Result<String> {
    loop {
        if let Some(line) = buffer.take_line() {
            return Ok(line);
        }
        stream
            .readable()
            .await
            .map_err(HamlibError::ReadFailed)?;
        buffer.fill_from(stream)?;
    }
}

/// `RPRT <status>` with a negative status is a daemon-level error. The
/// connection stays up; only the command failed.
pub(crate) fn netctl_error_status(line: &str) -> Option<i32> {
    let status: i32 = line.strip_prefix("RPRT ")?.trim().parse().ok()?;
    (status < 0).then_some(status)
}

#[cfg(test)]
pub(crate) mod test_server;
