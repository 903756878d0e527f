//! Upstream side of a relayed TCP connection
//!
//! The relay owns the real socket to the forward target. It writes what the
//! console sent and reports what came back as [`UpstreamEvent`]s; turning
//! those into segments is the engine's job.

use crate::{Error, Result};
use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Size of each upstream read, and so the largest relayed segment
pub const READ_CHUNK: usize = 4096;

#[derive(Debug)]
pub enum UpstreamEvent {
    /// Bytes read from the target
    Data(Vec<u8>),
    /// Target closed its sending side
    Eof,
    /// Socket error; the relay has stopped
    Failed(Error),
}

/// Connect to the forward target, giving up after `timeout`
pub async fn connect(target: SocketAddrV4, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => {
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }
        Ok(Err(e)) => Err(Error::Io(e)),
        Err(_) => Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("connect to {} timed out", target),
        ))),
    }
}

/// Pump bytes between `stream` and the session.
///
/// Runs until the console side hangs up (`to_upstream` closes), the event
/// receiver goes away, or the socket fails. After upstream EOF the relay
/// keeps writing console data until the session is done with it.
pub async fn relay(
    stream: TcpStream,
    mut to_upstream: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::Sender<UpstreamEvent>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut reading = true;

    loop {
        tokio::select! {
            data = to_upstream.recv() => {
                let Some(data) = data else {
                    trace!("console side done, closing upstream");
                    let _ = write_half.shutdown().await;
                    return;
                };
                if let Err(e) = write_half.write_all(&data).await {
                    let _ = events.send(UpstreamEvent::Failed(Error::Io(e))).await;
                    return;
                }
            }

            result = read_half.read(&mut buf), if reading => {
                let event = match result {
                    Ok(0) => {
                        debug!("upstream EOF");
                        reading = false;
                        UpstreamEvent::Eof
                    }
                    Ok(n) => UpstreamEvent::Data(buf[..n].to_vec()),
                    Err(e) => {
                        let _ = events.send(UpstreamEvent::Failed(Error::Io(e))).await;
                        return;
                    }
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}
