//! NSQ consumers: one TCP connection per registered subscription.
//!
//! [`ConsumerManager::run`] opens every subscription before returning, so a
//! broker that is unreachable at startup fails the caller. After that each
//! subscription runs in its own task, reconnecting with capped, jittered
//! backoff until [`ConsumerManager::stop`] is called.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use stackdemo_core::{ChannelName, TopicName};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{
    Command, Frame, NsqCodec, NsqMessage, ProtocolError, CLOSE_WAIT, MAGIC_V2, OK,
};
use crate::config::NsqConfig;

type Connection = Framed<TcpStream, NsqCodec>;

/// How long `stop` waits for nsqd to acknowledge `CLS`.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Processes delivered messages. `Ok` finishes the message; `Err` requeues
/// it according to the [`DeliveryPolicy`].
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: &NsqMessage) -> anyhow::Result<()>;
}

/// Decides how a handled message is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Attempts after which a failing message is finished instead of requeued.
    pub max_attempts: u16,
    /// Requeue delay per attempt already made.
    pub requeue_delay: Duration,
    /// Upper bound on the requeue delay.
    pub max_backoff: Duration,
}

impl DeliveryPolicy {
    /// Maps a handler outcome to the command that settles the message.
    #[must_use]
    pub fn settle(&self, message: &NsqMessage, outcome: &anyhow::Result<()>) -> Command {
        match outcome {
            Ok(()) => Command::Finish(message.id),
            Err(e) if message.attempts >= self.max_attempts => {
                warn!(
                    id = %message.id,
                    attempts = message.attempts,
                    error = %e,
                    "giving up on message after max attempts"
                );
                Command::Finish(message.id)
            }
            Err(e) => {
                let delay = self
                    .requeue_delay
                    .saturating_mul(u32::from(message.attempts))
                    .min(self.max_backoff);
                debug!(id = %message.id, attempts = message.attempts, error = %e, "requeueing message");
                Command::Requeue {
                    id: message.id,
                    delay,
                }
            }
        }
    }
}

/// Connection and delivery settings shared by all subscriptions.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// nsqd TCP address.
    pub address: String,
    /// `RDY` count: messages nsqd may push before they are settled.
    pub max_in_flight: u32,
    pub policy: DeliveryPolicy,
    pub connect_timeout: Duration,
    /// First reconnect delay; doubles per failed attempt.
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl ConsumerConfig {
    #[must_use]
    pub fn from_nsq(config: &NsqConfig) -> Self {
        Self {
            address: config.nsqd_tcp.clone(),
            max_in_flight: config.max_in_flight,
            policy: DeliveryPolicy {
                max_attempts: config.max_attempts,
                requeue_delay: Duration::from_millis(config.requeue_delay_ms),
                max_backoff: Duration::from_millis(config.max_backoff_ms),
            },
            ..Self::default()
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:4150".to_string(),
            max_in_flight: 50,
            policy: DeliveryPolicy {
                max_attempts: 10,
                requeue_delay: Duration::ZERO,
                max_backoff: Duration::from_millis(50),
            },
            connect_timeout: Duration::from_secs(5),
            reconnect_base: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

struct Subscription {
    topic: TopicName,
    channel: ChannelName,
    handler: Arc<dyn MessageHandler>,
}

/// Owns the registered subscriptions and their consumer tasks.
pub struct ConsumerManager {
    config: ConsumerConfig,
    pending: Vec<Subscription>,
    tasks: Vec<JoinHandle<()>>,
    token: CancellationToken,
}

impl ConsumerManager {
    #[must_use]
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            tasks: Vec::new(),
            token: CancellationToken::new(),
        }
    }

    /// Registers a handler for `topic` on `channel`. Takes effect on `run`.
    pub fn register(
        &mut self,
        topic: TopicName,
        channel: ChannelName,
        handler: impl MessageHandler,
    ) {
        self.pending.push(Subscription {
            topic,
            channel,
            handler: Arc::new(handler),
        });
    }

    /// Number of running subscription tasks.
    #[must_use]
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Connects every registered subscription and starts consuming.
    ///
    /// # Errors
    ///
    /// Returns an error naming the subscription whose first connection failed.
    /// Subscriptions started before the failure keep running until `stop`.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        for sub in std::mem::take(&mut self.pending) {
            let conn = connect(&self.config, &sub.topic, &sub.channel)
                .await
                .with_context(|| {
                    format!(
                        "failed to connect consumer {}/{} to {}",
                        sub.topic, sub.channel, self.config.address
                    )
                })?;
            info!(topic = %sub.topic, channel = %sub.channel, "consumer connected");

            let task = tokio::spawn(consume(
                conn,
                sub,
                self.config.clone(),
                self.token.child_token(),
            ));
            self.tasks.push(task);
        }
        Ok(())
    }

    /// Closes every subscription and waits for its task to finish.
    pub async fn stop(&mut self) {
        self.token.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "consumer task failed during stop");
            }
        }
    }
}

/// Opens a connection and completes the `IDENTIFY`/`SUB`/`RDY` handshake.
async fn connect(
    config: &ConsumerConfig,
    topic: &TopicName,
    channel: &ChannelName,
) -> Result<Connection, ProtocolError> {
    let mut stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&config.address))
        .await
        .map_err(|_| {
            ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            ))
        })??;
    stream.write_all(MAGIC_V2).await?;

    let mut conn = Framed::new(stream, NsqCodec);
    conn.send(Command::Identify(identify_body())).await?;
    expect_ok(&mut conn).await?;
    conn.send(Command::Subscribe {
        topic: topic.clone(),
        channel: channel.clone(),
    })
    .await?;
    expect_ok(&mut conn).await?;
    conn.send(Command::Ready(config.max_in_flight)).await?;
    Ok(conn)
}

fn identify_body() -> Bytes {
    let body = serde_json::json!({
        "client_id": "stackdemo",
        "user_agent": concat!("stackdemo/", env!("CARGO_PKG_VERSION")),
        "feature_negotiation": false,
        "heartbeat_interval": HEARTBEAT_INTERVAL_MS,
    });
    Bytes::from(body.to_string())
}

/// Reads frames until an `OK` response, answering heartbeats on the way.
async fn expect_ok(conn: &mut Connection) -> Result<(), ProtocolError> {
    loop {
        match conn.next().await {
            Some(Ok(frame)) if frame.is_heartbeat() => conn.send(Command::Nop).await?,
            Some(Ok(Frame::Response(body))) if body.as_ref() == OK => return Ok(()),
            Some(Ok(Frame::Response(body))) => {
                return Err(ProtocolError::UnexpectedResponse(lossy(&body)))
            }
            Some(Ok(Frame::Error(body))) => return Err(ProtocolError::Server(lossy(&body))),
            Some(Ok(Frame::Message(message))) => {
                return Err(ProtocolError::UnexpectedResponse(format!(
                    "message {} before subscription",
                    message.id
                )))
            }
            Some(Err(e)) => return Err(e),
            None => return Err(ProtocolError::ConnectionClosed),
        }
    }
}

fn lossy(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

/// Subscription task: drives the connection and reconnects until cancelled.
async fn consume(
    mut conn: Connection,
    sub: Subscription,
    config: ConsumerConfig,
    token: CancellationToken,
) {
    loop {
        match drive(&mut conn, sub.handler.as_ref(), &config.policy, &token).await {
            Ok(()) => return,
            Err(e) => warn!(topic = %sub.topic, channel = %sub.channel, error = %e, "consumer connection lost"),
        }

        let mut attempt = 0u32;
        conn = loop {
            let delay = reconnect_delay(attempt, config.reconnect_base, config.reconnect_max);
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            match connect(&config, &sub.topic, &sub.channel).await {
                Ok(conn) => {
                    info!(topic = %sub.topic, channel = %sub.channel, "consumer reconnected");
                    break conn;
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    warn!(topic = %sub.topic, attempt, error = %e, "consumer reconnect failed");
                }
            }
        };
    }
}

/// Handles frames until cancelled (`Ok`) or the connection fails (`Err`).
async fn drive(
    conn: &mut Connection,
    handler: &dyn MessageHandler,
    policy: &DeliveryPolicy,
    token: &CancellationToken,
) -> Result<(), ProtocolError> {
    loop {
        let frame = tokio::select! {
            () = token.cancelled() => {
                close(conn).await;
                return Ok(());
            }
            frame = conn.next() => frame,
        };

        match frame {
            Some(Ok(frame)) if frame.is_heartbeat() => conn.send(Command::Nop).await?,
            Some(Ok(Frame::Message(message))) => {
                let outcome = handler.handle(&message).await;
                conn.send(policy.settle(&message, &outcome)).await?;
            }
            Some(Ok(Frame::Response(body))) => debug!(response = %lossy(&body), "nsqd response"),
            Some(Ok(Frame::Error(body))) => warn!(error = %lossy(&body), "nsqd reported an error"),
            Some(Err(e)) => return Err(e),
            None => return Err(ProtocolError::ConnectionClosed),
        }
    }
}

/// Sends `CLS` and waits briefly for `CLOSE_WAIT`; failures only get logged.
async fn close(conn: &mut Connection) {
    if let Err(e) = conn.send(Command::Close).await {
        debug!(error = %e, "failed to send CLS");
        return;
    }
    let acknowledged = tokio::time::timeout(CLOSE_TIMEOUT, async {
        while let Some(Ok(frame)) = conn.next().await {
            if matches!(&frame, Frame::Response(body) if body.as_ref() == CLOSE_WAIT) {
                return true;
            }
        }
        false
    })
    .await;
    if !matches!(acknowledged, Ok(true)) {
        debug!("nsqd did not acknowledge CLS");
    }
}

/// Exponential backoff from `base`, capped at `max`, plus up to 25% jitter.
fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    let capped = base.saturating_mul(factor).min(max);
    let jitter_ms = u64::try_from(capped.as_millis() / 4).unwrap_or(0);
    capped + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
}
