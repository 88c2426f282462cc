//! In-process mock hamlib daemons for client tests.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// How the mock answers commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Reply like a healthy daemon.
    Answer,
    /// Accept connections but never reply.
    Silent,
    /// Close every connection immediately after accepting it.
    HangUp,
    /// Reply to the first command with an endless unterminated line.
    Garbage,
}

/// Shared log of every line the mock received, tagged with the index of
/// the connection it arrived on.
pub type CommandLog = Arc<Mutex<Vec<(usize, String)>>>;

pub struct MockDaemon {
    pub port: u16,
    pub log: CommandLog,
}

impl MockDaemon {
    /// Lines received on any connection, in arrival order.
    pub fn lines(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(_, l)| l.clone()).collect()
    }

    /// Lines received on one specific connection (0-based accept order).
    pub fn lines_on(&self, connection: usize) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == connection)
            .map(|(_, l)| l.clone())
            .collect()
    }
}

fn reply_for(line: &str) -> Option<String> {
    if line.starts_with(";p") {
        Some("get_pos:;Azimuth: 12.00;Elevation: 34.00;RPRT 0\n".to_string())
    } else if line.starts_with("P ") || line.starts_with("V ") || line.starts_with("F ") {
        Some("RPRT 0\n".to_string())
    } else if line == "p" {
        Some("123.00\n45.00\n".to_string())
    } else if line == "f" {
        Some("145900000\n".to_string())
    } else if line == "q" {
        None
    } else {
        Some("RPRT -1\n".to_string())
    }
}

/// Spawn a mock daemon on an ephemeral port.
pub async fn spawn_mock(behavior: MockBehavior) -> MockDaemon {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));

    let accept_log = log.clone();
    tokio::spawn(async move {
        let mut connection_index = 0usize;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let connection = connection_index;
            connection_index += 1;

            if behavior == MockBehavior::HangUp {
                drop(stream);
                continue;
            }

            let log = accept_log.clone();
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut lines = BufReader::new(read_half).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log.lock().unwrap().push((connection, line.clone()));
                    match behavior {
                        MockBehavior::Silent => {}
                        MockBehavior::Garbage => {
                            let junk = vec![b'x'; 4096];
                            let _ = write_half.write_all(&junk).await;
                        }
                        MockBehavior::Answer => {
                            let Some(reply) = reply_for(&line) else {
                                return;
                            };
                            if write_half.write_all(reply.as_bytes()).await.is_err() {
                                return;
                            }
                        }
                        MockBehavior::HangUp => unreachable!(),
                    }
                }
            });
        }
    });

    MockDaemon { port, log }
}
