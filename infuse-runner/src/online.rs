//! Online mode: changes arrive as UDP datagrams, one record per
//! datagram, padded to `DATAGRAM_SIZE` bytes with NULs or whitespace.
//! The stream ends once no datagram arrives for the receive timeout.
//!
//! Reception runs on its own task and hands decoded changes over a
//! channel; checking stays on the caller's task, one change at a time.
use crate::offline::Stats;
use crate::record;
use infuse_engine::{ContextChange, Engine};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub const DEFAULT_PORT: u16 = 6244;
pub const DATAGRAM_SIZE: usize = 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns the record carried by `datagram`, without its padding.
#[must_use]
pub fn payload(datagram: &[u8]) -> &[u8] {
    let end = datagram
        .iter()
        .rposition(|b| *b != 0 && !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    let start = datagram[..end]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(end);
    &datagram[start..end]
}

/// Receives datagrams until `timeout` passes without one, and
/// forwards the decoded changes.  Returns the number of datagrams
/// that could not be decoded.
pub async fn receive(socket: UdpSocket, timeout: Duration, tx: mpsc::Sender<ContextChange>) -> usize {
    let mut buf = vec![0u8; DATAGRAM_SIZE];
    let mut failures = 0;

    loop {
        let len = match tokio::time::timeout(timeout, socket.recv_from(&mut buf)).await {
            Err(_) => {
                info!(?timeout, "receive timeout, ending stream");
                break;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "receive failed");
                continue;
            }
            Ok(Ok((len, _))) => len,
        };

        let bytes = payload(&buf[..len]);
        if bytes.is_empty() {
            continue;
        }

        let decoded = std::str::from_utf8(bytes)
            .map_err(|e| e.to_string())
            .and_then(|text| record::decode(text).map_err(|e| e.to_string()));
        match decoded {
            Ok(change) => {
                if tx.send(change).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "bad datagram");
                failures += 1;
            }
        }
    }

    failures
}

/// Checks every change received on `socket`, then flushes `engine`.
pub async fn run(engine: &mut Engine, socket: UdpSocket, timeout: Duration) -> Stats {
    let (tx, mut rx) = mpsc::channel(1024);
    let receiver = tokio::spawn(receive(socket, timeout, tx));

    let mut stats = Stats::default();
    while let Some(change) = rx.recv().await {
        stats.records += 1;
        if let Err(e) = engine.submit(change) {
            error!(error = %e, "change failed");
            stats.failures += 1;
        }
    }

    match receiver.await {
        Ok(failures) => {
            stats.records += failures;
            stats.failures += failures;
        }
        Err(e) => error!(error = %e, "receiver task failed"),
    }

    if let Err(e) = engine.finish() {
        error!(error = %e, "final flush failed");
    }

    info!(records = stats.records, failures = stats.failures, "online stream done");
    stats
}

#[test]
fn test_payload_trims_padding() {
    let mut datagram = b"  {\"a\": 1}\n".to_vec();
    datagram.resize(DATAGRAM_SIZE, 0);

    assert_eq!(payload(&datagram), b"{\"a\": 1}");
    assert_eq!(payload(&[0u8; 16]), b"");
    assert_eq!(payload(b" \n\t"), b"");
}
