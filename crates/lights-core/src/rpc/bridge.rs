//! Bridges an async byte stream to a poll-driven [`RpcEngine`].
//!
//! Each connection gets three activities:
//!
//! - a read pump task, moving chunks from the socket to the poll step
//! - a write pump task, moving encoded output from the poll step to the socket
//! - the poll step, on a blocking thread, the only code that touches the engine
//!
//! All three share one continue flag. Whichever side hits peer EOF, an I/O
//! error, a protocol error or server shutdown clears it; the others notice
//! within one bounded wait. Socket reads and writes are bounded too, so a peer
//! that stops reading cannot keep a cancelled session alive.
//!
//! Both queues are bounded. While the peer leaves output unread the poll step
//! stops taking requests, the inbound queue fills and the read pump stops
//! reading, which pushes back on the peer instead of growing buffers.

use super::engine::RpcEngine;
use crate::cancel::CancellationToken;
use crate::config::BridgeConfig;
use crate::{LightsError, Result};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

/// One connection session: a stream plus the engine serving it.
pub struct RpcBridge<S, E> {
    stream: S,
    engine: E,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S, E> RpcBridge<S, E>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    E: RpcEngine + 'static,
{
    pub fn new(stream: S, engine: E) -> Self {
        Self {
            stream,
            engine,
            shutdown: None,
        }
    }

    /// End the session once `shutdown` turns `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Serve the connection until it ends.
    ///
    /// Returns the protocol error that closed the connection, if any. Both
    /// pumps have finished by the time this returns.
    pub async fn run(self) -> Result<()> {
        let (reader, writer) = tokio::io::split(self.stream);
        let running = CancellationToken::new();
        let peer_eof = Arc::new(AtomicBool::new(false));
        let (inbound_tx, inbound_rx) = mpsc::channel(BridgeConfig::INBOUND_QUEUE_DEPTH);
        let (outbound_tx, outbound_rx) = mpsc::channel(BridgeConfig::OUTBOUND_QUEUE_DEPTH);

        let read_task = tokio::spawn(read_pump(
            reader,
            inbound_tx,
            running.clone(),
            Arc::clone(&peer_eof),
        ));
        let write_task = tokio::spawn(write_pump(writer, outbound_rx, running.clone()));

        let poll = PollStep {
            engine: self.engine,
            inbound: inbound_rx,
            outbound: outbound_tx,
            running: running.clone(),
            peer_eof,
            shutdown: self.shutdown,
        };
        let joined = tokio::task::spawn_blocking(move || poll.run()).await;

        // The poll step may have died without clearing the flag
        running.cancel();
        let _ = read_task.await;
        let _ = write_task.await;

        let (engine, outcome) =
            joined.map_err(|e| LightsError::Other(format!("poll step failed: {}", e)))?;
        drop(engine);
        outcome
    }
}

async fn read_pump<R: AsyncRead + Unpin>(
    mut reader: R,
    inbound: Sender<Vec<u8>>,
    running: CancellationToken,
    peer_eof: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; BridgeConfig::READ_CHUNK_SIZE];
    while running.should_continue() {
        // Reserve before reading so a full queue leaves bytes in the socket
        let permit = match timeout(BridgeConfig::PUMP_WAIT, inbound.reserve()).await {
            Err(_elapsed) => continue,
            Ok(Err(_closed)) => break,
            Ok(Ok(permit)) => permit,
        };

        match timeout(BridgeConfig::PUMP_WAIT, reader.read(&mut buf)).await {
            Err(_elapsed) => continue,
            Ok(Ok(0)) => {
                debug!("Peer closed its write half");
                peer_eof.store(true, Ordering::SeqCst);
                break;
            }
            Ok(Ok(n)) => permit.send(buf[..n].to_vec()),
            Ok(Err(e)) => {
                debug!("Read failed: {}", e);
                running.cancel();
                break;
            }
        }
    }
}

async fn write_pump<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: Receiver<Vec<u8>>,
    running: CancellationToken,
) {
    loop {
        match timeout(BridgeConfig::PUMP_WAIT, outbound.recv()).await {
            Ok(Some(chunk)) => {
                if let Err(e) = write_chunk(&mut writer, &chunk, &running).await {
                    debug!("Write failed: {}", e);
                    running.cancel();
                    break;
                }
            }
            // Poll step finished and everything it queued has been written
            Ok(None) => break,
            Err(_elapsed) if running.is_cancelled() => break,
            Err(_elapsed) => {}
        }
    }

    match timeout(BridgeConfig::PUMP_WAIT, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Shutdown of write half failed: {}", e),
        Err(_elapsed) => debug!("Peer is not reading, abandoning write half"),
    }
}

/// Write all of `chunk` in bounded steps, keeping the offset across partial
/// writes. Gives up at the first stalled step once the session is cancelled.
async fn write_chunk<W: AsyncWrite + Unpin>(
    writer: &mut W,
    chunk: &[u8],
    running: &CancellationToken,
) -> io::Result<()> {
    let mut offset = 0;
    while offset < chunk.len() {
        match timeout(BridgeConfig::PUMP_WAIT, writer.write(&chunk[offset..])).await {
            Ok(Ok(0)) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(Ok(n)) => offset += n,
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) if running.is_cancelled() => return Err(stalled()),
            Err(_elapsed) => {}
        }
    }

    loop {
        match timeout(BridgeConfig::PUMP_WAIT, writer.flush()).await {
            Ok(result) => return result,
            Err(_elapsed) if running.is_cancelled() => return Err(stalled()),
            Err(_elapsed) => {}
        }
    }
}

fn stalled() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "peer stopped reading")
}

struct PollStep<E> {
    engine: E,
    inbound: Receiver<Vec<u8>>,
    outbound: Sender<Vec<u8>>,
    running: CancellationToken,
    peer_eof: Arc<AtomicBool>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<E: RpcEngine> PollStep<E> {
    fn run(mut self) -> (E, Result<()>) {
        let mut outcome = Ok(());

        while self.running.should_continue() {
            // Read before draining: chunks sent before EOF are already queued
            let eof = self.peer_eof.load(Ordering::SeqCst);

            // Unwritten output holds back new requests for this tick
            if self.flush_outbound() {
                while let Ok(chunk) = self.inbound.try_recv() {
                    self.engine.feed(&chunk);
                }

                if let Err(e) = self.engine.poll_once() {
                    warn!("Closing connection: {}", e);
                    self.running.cancel();
                    outcome = Err(e);
                    break;
                }

                if self.flush_outbound() && eof {
                    self.running.cancel();
                    break;
                }
            }

            if self.shutdown_requested() {
                self.running.cancel();
                break;
            }

            thread::sleep(BridgeConfig::POLL_INTERVAL);
        }

        (self.engine, outcome)
    }

    /// Move engine output into the write queue while it has room.
    ///
    /// Returns `true` when nothing is left pending in the engine.
    fn flush_outbound(&mut self) -> bool {
        while self.engine.pending_outbound() > 0 {
            let permit = match self.outbound.try_reserve() {
                Ok(permit) => permit,
                Err(TrySendError::Full(())) => return false,
                Err(TrySendError::Closed(())) => {
                    self.running.cancel();
                    return false;
                }
            };
            match self.engine.take_outbound(BridgeConfig::WRITE_CHUNK_SIZE) {
                Some(chunk) => permit.send(chunk),
                None => break,
            }
        }
        true
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }
}
