//! Test infrastructure for exercising the bridge without external services
//!
//! - [`ChannelSource`] - a [`RecordSource`] fed from a channel instead of a broker
//! - [`TestServer`] - a minimal HTTP/1.1 endpoint that records every POST body
//!   and can answer slowly or with a chosen status

use async_trait::async_trait;
use http_forward::Url;
use kafka_source::{
    Error as SourceError, PartitionKey, Record, RecordSource, Result as SourceResult,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Committed positions per partition, as the next offset to read.
#[derive(Debug, Clone, Default)]
pub struct Positions(Arc<Mutex<HashMap<PartitionKey, i64>>>);

impl Positions {
    pub fn committed(&self, key: &PartitionKey) -> Option<i64> {
        let positions = self.0.lock().unwrap_or_else(|e| e.into_inner());
        positions.get(key).copied()
    }

    // Synchronous so the commit cannot be cancelled between receive and yield.
    fn commit(&self, record: &Record) {
        let mut positions = self.0.lock().unwrap_or_else(|e| e.into_inner());
        positions.insert(record.partition_key(), record.offset + 1);
    }
}

/// A record source backed by an mpsc channel.
///
/// Like the Kafka consumer, a record's position is committed as soon as the
/// record is yielded. Once every sender is gone the source behaves like a
/// quiet topic: it keeps waiting and never ends on its own.
pub struct ChannelSource {
    rx: mpsc::Receiver<SourceResult<Record>>,
    closed: Arc<AtomicBool>,
    positions: Positions,
}

impl ChannelSource {
    pub fn new(buffer: usize) -> (mpsc::Sender<SourceResult<Record>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            tx,
            Self {
                rx,
                closed: Arc::new(AtomicBool::new(false)),
                positions: Positions::default(),
            },
        )
    }

    /// Flag set once `close` has run.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub fn positions(&self) -> Positions {
        self.positions.clone()
    }
}

#[async_trait]
impl RecordSource for ChannelSource {
    async fn next_record(&mut self) -> SourceResult<Record> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SourceError::Closed);
        }
        match self.rx.recv().await {
            Some(Ok(record)) => {
                self.positions.commit(&record);
                Ok(record)
            }
            Some(Err(e)) => Err(e),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> SourceResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.close();
        Ok(())
    }
}

/// Counters kept by a [`TestServer`].
#[derive(Debug, Default)]
pub struct ServerStats {
    received: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ServerStats {
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    /// Highest number of requests being handled at the same time
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Local HTTP endpoint for forward tests.
pub struct TestServer {
    pub url: Url,
    bodies: mpsc::UnboundedReceiver<Value>,
    stats: Arc<ServerStats>,
    accept_loop: JoinHandle<()>,
}

impl TestServer {
    /// Answer every request with `status` after waiting `delay`.
    pub async fn start(status: u16, delay: Duration) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let url = format!("http://{addr}/")
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let (tx, bodies) = mpsc::unbounded_channel();
        let stats = Arc::new(ServerStats::default());

        let accept_stats = Arc::clone(&stats);
        let accept_loop = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let tx = tx.clone();
                let stats = Arc::clone(&accept_stats);
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(socket, status, delay, tx, stats).await {
                        tracing::debug!("Test server connection ended: {e}");
                    }
                });
            }
        });

        Ok(Self {
            url,
            bodies,
            stats,
            accept_loop,
        })
    }

    /// Next received body, in arrival order.
    pub async fn next_body(&mut self) -> Option<Value> {
        self.bodies.recv().await
    }

    /// Bodies received so far without waiting.
    pub fn drain_bodies(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(body) = self.bodies.try_recv() {
            out.push(body);
        }
        out
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

/// Returns a URL on which nothing is listening.
pub async fn unreachable_url() -> std::io::Result<Url> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    format!("http://{addr}/")
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
}

async fn serve_connection(
    mut socket: TcpStream,
    status: u16,
    delay: Duration,
    bodies: mpsc::UnboundedSender<Value>,
    stats: Arc<ServerStats>,
) -> std::io::Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        // Request head
        let head_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = socket.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.trim().eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);

        while buf.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let body: Vec<u8> = buf.drain(..head_end + content_length).skip(head_end).collect();

        let now = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_active.fetch_max(now, Ordering::SeqCst);
        stats.received.fetch_add(1, Ordering::SeqCst);
        if let Ok(value) = serde_json::from_slice(&body) {
            let _ = bodies.send(value);
        }

        tokio::time::sleep(delay).await;
        stats.active.fetch_sub(1, Ordering::SeqCst);

        let response = format!("HTTP/1.1 {status} Test\r\ncontent-length: 0\r\n\r\n");
        socket.write_all(response.as_bytes()).await?;
    }
}
