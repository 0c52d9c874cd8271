//! WebSocket subscription to `com.atproto.sync.subscribeRepos`.

use bytes::Bytes;
use futures::StreamExt;
use metrics::{counter, gauge};
use rand::Rng;
use skyetl_config::shared::SourceConfig;
use tokio::net::TcpStream;
use tokio::time::{Duration, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::error::EtlResult;
use crate::metrics::{SKYETL_SOURCE_CONNECTION_ATTEMPTS_TOTAL, SKYETL_SOURCE_CONSECUTIVE_FAILURES};
use crate::source::EventSource;

/// Fraction of the backoff applied as random jitter in each direction.
const BACKOFF_JITTER: f64 = 0.2;

type FirehoseStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Firehose subscription that reconnects on its own.
///
/// Connection failures and disconnects never surface as errors: the source waits with
/// exponential backoff and jitter, then connects again. The backoff resets once a frame is
/// received on the new connection.
pub struct FirehoseSource {
    url: String,
    initial_backoff: Duration,
    max_backoff: Duration,
    current_backoff: Duration,
    reconnect_delay: Option<Duration>,
    consecutive_failures: u32,
    stream: Option<FirehoseStream>,
}

impl FirehoseSource {
    pub fn new(config: &SourceConfig) -> Self {
        let initial_backoff = Duration::from_millis(config.initial_backoff_ms);

        Self {
            url: config.url.clone(),
            initial_backoff,
            max_backoff: Duration::from_millis(config.max_backoff_ms).max(initial_backoff),
            current_backoff: initial_backoff,
            reconnect_delay: None,
            consecutive_failures: 0,
            stream: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn connect(&mut self) -> bool {
        if let Some(delay) = self.reconnect_delay.take() {
            debug!(delay_ms = delay.as_millis() as u64, "waiting before reconnecting to firehose");
            sleep(delay).await;
        }

        counter!(SKYETL_SOURCE_CONNECTION_ATTEMPTS_TOTAL).increment(1);
        debug!(url = %self.url, "connecting to firehose");

        match connect_async(self.url.as_str()).await {
            Ok((stream, _)) => {
                info!(url = %self.url, "connected to firehose");
                self.stream = Some(stream);
                true
            }
            Err(err) => {
                warn!(url = %self.url, error = %err, "failed to connect to firehose");
                self.record_failure();
                false
            }
        }
    }

    fn record_failure(&mut self) {
        self.stream = None;
        self.consecutive_failures += 1;
        gauge!(SKYETL_SOURCE_CONSECUTIVE_FAILURES).set(self.consecutive_failures as f64);

        self.reconnect_delay = Some(self.calculate_backoff(self.current_backoff));
        self.current_backoff = (self.current_backoff * 2).min(self.max_backoff);
    }

    fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            gauge!(SKYETL_SOURCE_CONSECUTIVE_FAILURES).set(0.0);
        }
        self.consecutive_failures = 0;
        self.current_backoff = self.initial_backoff;
    }

    /// Applies random jitter to `base_backoff`.
    fn calculate_backoff(&self, base_backoff: Duration) -> Duration {
        let jitter_range = base_backoff.as_secs_f64() * BACKOFF_JITTER;
        if jitter_range <= 0.0 {
            return base_backoff;
        }

        let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
        Duration::from_secs_f64((base_backoff.as_secs_f64() + jitter).max(0.0))
    }
}

impl EventSource for FirehoseSource {
    fn name() -> &'static str {
        "firehose"
    }

    async fn next_frame(&mut self) -> EtlResult<Option<Bytes>> {
        loop {
            let stream = match self.stream.as_mut() {
                Some(stream) => stream,
                None => {
                    self.connect().await;
                    continue;
                }
            };

            match stream.next().await {
                Some(Ok(Message::Binary(frame))) => {
                    self.record_success();
                    return Ok(Some(frame));
                }
                Some(Ok(Message::Close(close_frame))) => {
                    info!(?close_frame, "firehose closed the connection");
                    self.record_failure();
                }
                Some(Ok(other)) => {
                    debug!(kind = ?other, "ignoring non-binary firehose message");
                }
                Some(Err(err)) => {
                    warn!(error = %err, "firehose connection failed");
                    self.record_failure();
                }
                None => {
                    info!("firehose stream ended");
                    self.record_failure();
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn config(url: String) -> SourceConfig {
        SourceConfig {
            url,
            initial_backoff_ms: 10,
            max_backoff_ms: 40,
        }
    }

    async fn bind_listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    /// Accepts `connections` connections in turn, sending the given frames on each and
    /// closing it afterwards.
    fn mock_server(
        listener: TcpListener,
        connections: Vec<Vec<&'static [u8]>>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            for frames in connections {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                for frame in frames {
                    ws.send(Message::Binary(Bytes::from_static(frame)))
                        .await
                        .unwrap();
                }
                ws.close(None).await.unwrap();
            }
        })
    }

    #[test]
    fn backoff_jitter_stays_within_bounds() {
        let source = FirehoseSource::new(&config("ws://localhost/".into()));

        for _ in 0..100 {
            let backoff = source.calculate_backoff(Duration::from_millis(1_000));
            assert!(backoff >= Duration::from_millis(800));
            assert!(backoff <= Duration::from_millis(1_200));
        }
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let mut source = FirehoseSource::new(&config("ws://localhost/".into()));

        source.record_failure();
        assert_eq!(source.current_backoff, Duration::from_millis(20));
        source.record_failure();
        source.record_failure();
        assert_eq!(source.current_backoff, Duration::from_millis(40));
        assert_eq!(source.consecutive_failures, 3);

        source.record_success();
        assert_eq!(source.current_backoff, Duration::from_millis(10));
        assert_eq!(source.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn delivers_binary_frames_in_order() {
        let (listener, addr) = bind_listener().await;
        let server = mock_server(listener, vec![vec![b"one", b"two"]]);
        let mut source = FirehoseSource::new(&config(format!("ws://{addr}/")));

        assert_eq!(source.next_frame().await.unwrap().unwrap(), &b"one"[..]);
        assert_eq!(source.next_frame().await.unwrap().unwrap(), &b"two"[..]);
        assert!(source.is_connected());

        source.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_close() {
        let (listener, addr) = bind_listener().await;
        let server = mock_server(listener, vec![vec![b"first"], vec![b"second"]]);
        let mut source = FirehoseSource::new(&config(format!("ws://{addr}/")));

        assert_eq!(source.next_frame().await.unwrap().unwrap(), &b"first"[..]);
        assert_eq!(source.next_frame().await.unwrap().unwrap(), &b"second"[..]);

        source.close().await;
        server.await.unwrap();
    }
}
