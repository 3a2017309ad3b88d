use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::{BusError, MemoryBus, Transport};

/// Longest a single pop request blocks on the broker. Clients re-poll for longer waits.
const MAX_POP_WAIT: Duration = Duration::from_secs(60);

/// Idle client connections kept around for reuse.
const MAX_IDLE_CONNECTIONS: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Push { queue: String, payload: String },
    Pop { queue: String, timeout_ms: u64 },
    Discard { queue: String },
}

impl Request {
    fn op(&self) -> &'static str {
        match self {
            Self::Push { .. } => "push",
            Self::Pop { .. } => "pop",
            Self::Discard { .. } => "discard",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Response {
    Ok,
    Item { payload: Option<String> },
    Error { message: String },
}

/// TCP broker exposing a [`MemoryBus`] as newline-delimited JSON.
#[derive(Debug)]
pub struct BusServer {
    addr: SocketAddr,
    bus: Arc<MemoryBus>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl BusServer {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, BusError> {
        Self::bind_with(addr, Arc::new(MemoryBus::new())).await
    }

    pub async fn bind_with(addr: impl ToSocketAddrs, bus: Arc<MemoryBus>) -> Result<Self, BusError> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(accept_loop(listener, bus.clone(), shutdown_rx));

        tracing::info!(%addr, "bus listening");

        Ok(Self {
            addr,
            bus,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn bus(&self) -> &Arc<MemoryBus> {
        &self.bus
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for BusServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    bus: Arc<MemoryBus>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "bus client connected");
                    connections.spawn(serve_connection(stream, bus.clone()));
                }
                Err(err) => tracing::warn!("bus accept failed: {err}"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.shutdown().await;
    tracing::debug!(queues = bus.queue_count(), "bus stopped");
}

async fn serve_connection(stream: TcpStream, bus: Arc<MemoryBus>) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(err) => {
                tracing::debug!("bus client read failed: {err}");
                return;
            }
        };

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(req) => handle_request(&bus, req).await,
            Err(err) => Response::Error {
                message: format!("malformed request: {err}"),
            },
        };

        if let Err(err) = write_frame(&mut write, &response).await {
            tracing::debug!("bus client write failed: {err}");
            return;
        }
    }
}

async fn handle_request(bus: &MemoryBus, req: Request) -> Response {
    match req {
        Request::Push { queue, payload } => {
            bus.push_now(&queue, payload);
            Response::Ok
        }
        Request::Pop { queue, timeout_ms } => {
            let wait = Duration::from_millis(timeout_ms).min(MAX_POP_WAIT);
            Response::Item {
                payload: bus.pop_wait(&queue, wait).await,
            }
        }
        Request::Discard { queue } => {
            bus.discard_now(&queue);
            Response::Ok
        }
    }
}

async fn write_frame<T: Serialize>(write: &mut OwnedWriteHalf, frame: &T) -> Result<(), BusError> {
    let mut buf = serde_json::to_vec(frame)?;
    buf.push(b'\n');
    write.write_all(&buf).await?;
    write.flush().await?;
    Ok(())
}

fn millis_ceil(d: Duration) -> u64 {
    d.as_nanos().div_ceil(1_000_000).try_into().unwrap_or(u64::MAX)
}

#[derive(Debug)]
struct Connection {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl Connection {
    async fn open(addr: SocketAddr) -> Result<Self, BusError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read).lines(),
            write,
        })
    }

    async fn call(&mut self, req: &Request) -> Result<Response, BusError> {
        write_frame(&mut self.write, req).await?;
        match self.lines.next_line().await? {
            Some(line) => Ok(serde_json::from_str(&line)?),
            None => Err(BusError::Closed),
        }
    }
}

/// Client side of [`BusServer`].
///
/// Every request borrows a pooled connection for its whole round trip, so a blocking `pop` never
/// holds up concurrent pushes from the same process.
#[derive(Debug)]
pub struct TcpBus {
    addr: SocketAddr,
    idle: Mutex<Vec<Connection>>,
}

impl TcpBus {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, BusError> {
        let addr = tokio::net::lookup_host(addr)
            .await?
            .next()
            .ok_or_else(|| {
                BusError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "bus address did not resolve",
                ))
            })?;

        // Fail early when nothing is listening.
        let first = Connection::open(addr).await?;

        Ok(Self {
            addr,
            idle: Mutex::new(vec![first]),
        })
    }

    async fn checkout(&self) -> Result<Connection, BusError> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => Connection::open(self.addr).await,
        }
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
    }

    async fn call(&self, req: Request) -> Result<Response, BusError> {
        let mut conn = self.checkout().await?;
        // A failed connection is dropped instead of being returned to the pool.
        let resp = conn.call(&req).await?;
        self.checkin(conn);

        match resp {
            Response::Error { message } => Err(BusError::Rejected(message)),
            other => Ok(other),
        }
    }
}

#[async_trait::async_trait]
impl Transport for TcpBus {
    async fn push(&self, queue: &str, payload: String) -> Result<(), BusError> {
        let req = Request::Push {
            queue: queue.to_string(),
            payload,
        };
        let op = req.op();
        match self.call(req).await? {
            Response::Ok => Ok(()),
            _ => Err(BusError::UnexpectedResponse(op)),
        }
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, BusError> {
        let deadline = Instant::now() + timeout;

        loop {
            let wait = deadline
                .saturating_duration_since(Instant::now())
                .min(MAX_POP_WAIT);
            let req = Request::Pop {
                queue: queue.to_string(),
                timeout_ms: millis_ceil(wait),
            };
            let op = req.op();
            match self.call(req).await? {
                Response::Item { payload: Some(p) } => return Ok(Some(p)),
                Response::Item { payload: None } if Instant::now() >= deadline => return Ok(None),
                Response::Item { payload: None } => {}
                _ => return Err(BusError::UnexpectedResponse(op)),
            }
        }
    }

    async fn discard(&self, queue: &str) -> Result<(), BusError> {
        let req = Request::Discard {
            queue: queue.to_string(),
        };
        let op = req.op();
        match self.call(req).await? {
            Response::Ok => Ok(()),
            _ => Err(BusError::UnexpectedResponse(op)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_tagged_json() {
        let req = Request::Pop {
            queue: "jobs".to_string(),
            timeout_ms: 250,
        };
        match serde_json::to_string(&req) {
            Ok(s) => assert_eq!(s, r#"{"op":"pop","queue":"jobs","timeout_ms":250}"#),
            Err(err) => panic!("serialize: {err}"),
        }

        match serde_json::from_str::<Response>(r#"{"status":"item","payload":null}"#) {
            Ok(Response::Item { payload }) => assert!(payload.is_none()),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tcp_client_round_trips_through_broker() -> Result<(), BusError> {
        let server = BusServer::bind("127.0.0.1:0").await?;
        let client = TcpBus::connect(server.local_addr()).await?;

        client.push("jobs", "payload, with comma ".to_string()).await?;
        assert_eq!(server.bus().len("jobs"), 1);

        let got = client.pop("jobs", Duration::from_millis(500)).await?;
        assert_eq!(got.as_deref(), Some("payload, with comma "));

        let empty = client.pop("jobs", Duration::from_millis(50)).await?;
        assert!(empty.is_none());

        client.push("reply:1", "late".to_string()).await?;
        client.discard("reply:1").await?;
        assert!(server.bus().is_empty("reply:1"));

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn blocking_pop_does_not_stall_pushes() -> Result<(), BusError> {
        let server = BusServer::bind("127.0.0.1:0").await?;
        let client = Arc::new(TcpBus::connect(server.local_addr()).await?);

        let waiter = {
            let client = client.clone();
            tokio::spawn(async move { client.pop("reply", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        client.push("reply", "done".to_string()).await?;

        let got = match tokio::time::timeout(Duration::from_secs(2), waiter).await {
            Ok(Ok(res)) => res?,
            Ok(Err(err)) => panic!("waiter task panicked: {err}"),
            Err(_) => panic!("pop did not observe the push"),
        };
        assert_eq!(got.as_deref(), Some("done"));

        server.shutdown().await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn pop_waits_past_the_per_request_cap() -> Result<(), BusError> {
        let server = BusServer::bind("127.0.0.1:0").await?;
        let client = TcpBus::connect(server.local_addr()).await?;

        let started = Instant::now();
        let got = client.pop("reply", Duration::from_secs(90)).await?;
        assert!(got.is_none());
        assert!(started.elapsed() >= Duration::from_secs(90), "{:?}", started.elapsed());

        let pusher = {
            let bus = server.bus().clone();
            tokio::spawn(async move {
                tokio::time::sleep(MAX_POP_WAIT + Duration::from_secs(15)).await;
                bus.push_now("reply", "slow".to_string());
            })
        };
        let got = client.pop("reply", Duration::from_secs(120)).await?;
        assert_eq!(got.as_deref(), Some("slow"));
        if let Err(err) = pusher.await {
            panic!("pusher panicked: {err}");
        }

        server.shutdown().await;
        Ok(())
    }

    #[test]
    fn pop_wait_rounds_up_to_whole_millis() {
        assert_eq!(millis_ceil(Duration::ZERO), 0);
        assert_eq!(millis_ceil(Duration::from_micros(1)), 1);
        assert_eq!(millis_ceil(Duration::from_millis(250)), 250);
    }

    #[tokio::test]
    async fn connect_fails_without_broker() {
        let addr = match TcpListener::bind("127.0.0.1:0").await {
            Ok(l) => match l.local_addr() {
                Ok(a) => a,
                Err(err) => panic!("local_addr: {err}"),
            },
            Err(err) => panic!("bind: {err}"),
        };
        // Listener dropped above, nothing accepts on `addr` anymore.
        assert!(TcpBus::connect(addr).await.is_err());
    }
}
