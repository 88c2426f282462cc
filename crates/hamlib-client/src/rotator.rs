//! rotctld client
//!
//! Two sockets against the same daemon: one for position reads, one for
//! tracking commands. Tracking coalesces consecutive duplicate orders on
//! the rounded (azimuth, elevation) pair and never has more than one
//! uncommitted command in flight; the reply to the previous command must
//! be seen before the next one goes out.

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::{
    await_line, connect_socket, netctl_error_status, send_command, HamlibError, LineBuffer,
    Result,
};

struct Sockets {
    read_socket: TcpStream,
    track_socket: TcpStream,
}

pub struct RotatorClient {
    host: String,
    port: u16,
    sockets: Option<Sockets>,
    read_buffer: LineBuffer,
    track_buffer: LineBuffer,
    last_track_response_received: bool,
    prev_azimuth: f64,
    prev_elevation: f64,
    first_command_sent: bool,
    /// Elevation threshold in degrees below which tracking commands are
    /// suppressed.
    tracking_horizon: f64,
}

fn rounded_pair_differs(prev: (f64, f64), next: (f64, f64)) -> bool {
    (prev.0.round() as i64, prev.1.round() as i64)
        != (next.0.round() as i64, next.1.round() as i64)
}

impl RotatorClient {
    /// A client in the DISCONNECTED state. Tracking commands are silently
    /// dropped until [`RotatorClient::reconnect`] succeeds. Used when no
    /// rotator daemon is configured at all.
    pub fn disconnected() -> Self {
        Self {
            host: String::new(),
            port: 0,
            sockets: None,
            read_buffer: LineBuffer::new(),
            track_buffer: LineBuffer::new(),
            last_track_response_received: true,
            prev_azimuth: 0.0,
            prev_elevation: 0.0,
            first_command_sent: false,
            tracking_horizon: 0.0,
        }
    }

    /// Connect both sockets eagerly and prime the track socket with an
    /// extended position query, so the first tracking command has a
    /// bootstrap reply to consume.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let mut client = Self {
            host: host.to_string(),
            port,
            sockets: None,
            read_buffer: LineBuffer::new(),
            track_buffer: LineBuffer::new(),
            last_track_response_received: true,
            prev_azimuth: 0.0,
            prev_elevation: 0.0,
            first_command_sent: false,
            tracking_horizon: 0.0,
        };
        client.reconnect().await?;
        Ok(client)
    }

    /// (Re-)establish both connections and reset the tracking state.
    pub async fn reconnect(&mut self) -> Result<()> {
        let read_socket = connect_socket(&self.host, self.port).await?;
        let track_socket = connect_socket(&self.host, self.port).await?;

        // bootstrap: ask for the position in extended (single-line) form;
        // the reply releases the send-gate of the first track command
        send_command(&track_socket, ";p\n")?;

        self.sockets = Some(Sockets {
            read_socket,
            track_socket,
        });
        self.read_buffer = LineBuffer::new();
        self.track_buffer = LineBuffer::new();
        self.last_track_response_received = true;
        self.first_command_sent = false;
        info!("connected to rotctld at {}:{}", self.host, self.port);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.sockets.is_some()
    }

    pub fn set_tracking_horizon(&mut self, degrees: f64) {
        self.tracking_horizon = degrees;
    }

    pub fn tracking_horizon(&self) -> f64 {
        self.tracking_horizon
    }

    /// Rounded pair of the most recently sent tracking command.
    pub fn last_commanded(&self) -> Option<(f64, f64)> {
        self.first_command_sent
            .then_some((self.prev_azimuth, self.prev_elevation))
    }

    fn drop_connection(&mut self) {
        if self.sockets.take().is_some() {
            debug!("rotctld endpoint at {}:{} disconnected", self.host, self.port);
        }
    }

    fn transport_failure(&mut self, error: HamlibError) -> HamlibError {
        self.drop_connection();
        error
    }

    /// Send a tracking order. Silently dropped while disconnected or
    /// below the tracking horizon. Consecutive orders that round to the
    /// same whole-degree pair are coalesced, but the first order always
    /// goes out. A new command is held back until the reply to the
    /// previous one has arrived.
    pub fn track(&mut self, azimuth_deg: f64, elevation_deg: f64) -> Result<()> {
        if elevation_deg < self.tracking_horizon {
            return Ok(());
        }
        self.send_position_order(azimuth_deg, elevation_deg)
    }

    /// Point the rotator regardless of the tracking horizon, e.g. to park
    /// it at the azimuth of the next AOS. Coalescing and backpressure
    /// still apply.
    pub fn slew_to(&mut self, azimuth_deg: f64, elevation_deg: f64) -> Result<()> {
        self.send_position_order(azimuth_deg, elevation_deg)
    }

    fn send_position_order(&mut self, azimuth_deg: f64, elevation_deg: f64) -> Result<()> {
        let Some(sockets) = &self.sockets else {
            return Ok(());
        };

        let mut differs = rounded_pair_differs(
            (self.prev_azimuth, self.prev_elevation),
            (azimuth_deg, elevation_deg),
        );
        if !self.first_command_sent {
            differs = true;
        }

        // backpressure: consume the previous reply before sending again
        if !self.last_track_response_received {
            match self.track_buffer.fill_from(&sockets.track_socket) {
                Ok(_) => {}
                Err(e) => return Err(self.transport_failure(e)),
            }
            if self.track_buffer.take_line().is_some() {
                self.last_track_response_received = true;
            }
        }

        if differs && self.last_track_response_received {
            self.first_command_sent = true;
            self.prev_azimuth = azimuth_deg;
            self.prev_elevation = elevation_deg;

            let command = format!("P {:.2} {:.2}\n", azimuth_deg, elevation_deg);
            if let Err(e) = send_command(&sockets.track_socket, &command) {
                return Err(self.transport_failure(e));
            }
            self.last_track_response_received = false;
        }
        Ok(())
    }

    /// Query the current rotator position in degrees. A negative `RPRT`
    /// status is reported without tearing the connection down.
    pub async fn read_position(&mut self) -> Result<(f64, f64)> {
        let Some(sockets) = &self.sockets else {
            return Err(HamlibError::ConnectionClosed);
        };
        let result = read_position_on(&sockets.read_socket, &mut self.read_buffer).await;
        match result {
            Err(HamlibError::ReturnedStatusError(_)) => result,
            Err(e) => Err(self.transport_failure(e)),
            Ok(_) => result,
        }
    }

    /// Tell the daemon goodbye and drop both sockets.
    pub fn disconnect(&mut self) {
        if let Some(sockets) = &self.sockets {
            let _ = send_command(&sockets.read_socket, "q\n");
            let _ = send_command(&sockets.track_socket, "q\n");
        }
        self.drop_connection();
    }
}

async fn read_position_on(stream: &TcpStream, buffer: &mut LineBuffer) -> Result<(f64, f64)> {
    send_command(stream, "p\n")?;

    let azimuth_line = await_line(stream, buffer).await?;
    if let Some(status) = netctl_error_status(&azimuth_line) {
        return Err(HamlibError::ReturnedStatusError(status));
    }
    let azimuth: f64 = azimuth_line
        .trim()
        .parse()
        .map_err(|_| HamlibError::MalformedReply(azimuth_line.clone()))?;

    let elevation_line = await_line(stream, buffer).await?;
    let elevation: f64 = elevation_line
        .trim()
        .parse()
        .map_err(|_| HamlibError::MalformedReply(elevation_line.clone()))?;

    Ok((azimuth, elevation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{spawn_mock, MockBehavior};
    use std::time::Duration;
    use tokio::time::sleep;

    const TRACK_CONNECTION: usize = 1; // read socket connects first

    async fn settle() {
        sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_coalesces_duplicate_orders() {
        let mock = spawn_mock(MockBehavior::Answer).await;
        let mut client = RotatorClient::connect("127.0.0.1", mock.port).await.unwrap();
        settle().await;

        client.track(10.0, 20.0).unwrap();
        settle().await;
        client.track(10.4, 20.3).unwrap(); // rounds to the same (10, 20)
        settle().await;
        client.track(10.6, 20.4).unwrap(); // rounds to (11, 20)
        settle().await;

        let track_lines: Vec<String> = mock
            .lines_on(TRACK_CONNECTION)
            .into_iter()
            .filter(|l| l.starts_with("P "))
            .collect();
        assert_eq!(track_lines, vec!["P 10.00 20.00", "P 10.60 20.40"]);
    }

    #[tokio::test]
    async fn test_backpressure_holds_commands() {
        // a silent daemon never releases the send-gate
        let mock = spawn_mock(MockBehavior::Silent).await;
        let mut client = RotatorClient::connect("127.0.0.1", mock.port).await.unwrap();
        settle().await;

        client.track(10.0, 20.0).unwrap();
        settle().await;
        client.track(50.0, 60.0).unwrap(); // gate closed: must not send
        settle().await;

        let track_lines: Vec<String> = mock
            .lines_on(TRACK_CONNECTION)
            .into_iter()
            .filter(|l| l.starts_with("P "))
            .collect();
        assert_eq!(track_lines, vec!["P 10.00 20.00"]);
        // the held command must not clobber the last-sent pair
        assert_eq!(client.last_commanded(), Some((10.0, 20.0)));
    }

    #[tokio::test]
    async fn test_tracking_horizon_suppresses_commands() {
        let mock = spawn_mock(MockBehavior::Answer).await;
        let mut client = RotatorClient::connect("127.0.0.1", mock.port).await.unwrap();
        client.set_tracking_horizon(10.0);
        settle().await;

        client.track(120.0, 5.0).unwrap(); // below the horizon threshold
        settle().await;
        client.track(120.0, 15.0).unwrap();
        settle().await;

        let track_lines: Vec<String> = mock
            .lines_on(TRACK_CONNECTION)
            .into_iter()
            .filter(|l| l.starts_with("P "))
            .collect();
        assert_eq!(track_lines, vec!["P 120.00 15.00"]);
    }

    #[tokio::test]
    async fn test_read_position() {
        let mock = spawn_mock(MockBehavior::Answer).await;
        let mut client = RotatorClient::connect("127.0.0.1", mock.port).await.unwrap();

        let (azimuth, elevation) = client.read_position().await.unwrap();
        assert!((azimuth - 123.0).abs() < 1e-9);
        assert!((elevation - 45.0).abs() < 1e-9);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_hangup_transitions_to_disconnected() {
        let mock = spawn_mock(MockBehavior::HangUp).await;
        // connect may succeed at the TCP level before the server hangs up
        let Ok(mut client) = RotatorClient::connect("127.0.0.1", mock.port).await else {
            return;
        };
        settle().await;

        let result = client.read_position().await;
        assert!(result.is_err());
        assert!(!client.is_connected());

        // subsequent tracking commands are silently dropped
        client.track(10.0, 20.0).unwrap();
        assert_eq!(client.last_commanded(), None);
    }

    #[tokio::test]
    async fn test_oversized_reply_disconnects() {
        let mock = spawn_mock(MockBehavior::Garbage).await;
        let mut client = RotatorClient::connect("127.0.0.1", mock.port).await.unwrap();

        let result = client.read_position().await;
        assert!(matches!(result, Err(HamlibError::BufferOverflow)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // port 1 is never listening
        let result = RotatorClient::connect("127.0.0.1", 1).await;
        assert!(matches!(result, Err(HamlibError::ConnectFailed { .. })));
    }
}
