//! Telemetry transports
//!
//! A subscriber reads `(exchange, binding, body)` triples from one source and
//! keeps the ones its binding patterns select. Sources:
//! - newline-delimited JSON envelopes on stdin or from a replay file
//! - an in-process broadcast bus
//! - Zenoh, behind the `zenoh-integration` feature

use crate::config::{SubscriberConfig, TransportConfig};
use crate::router::MessageBody;
use crate::{Result, VizError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Capacity of the in-process bus before slow receivers start lagging
pub const MEMORY_BUS_CAPACITY: usize = 1024;

/// One message as delivered by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub exchange: String,
    pub binding: String,
    pub body: MessageBody,
}

impl RawMessage {
    pub fn new(exchange: impl Into<String>, binding: impl Into<String>, body: impl Into<MessageBody>) -> Self {
        Self {
            exchange: exchange.into(),
            binding: binding.into(),
            body: body.into(),
        }
    }
}

/// A connected source of telemetry for one subscriber.
#[async_trait]
pub trait TelemetrySource: Send {
    /// Next accepted message. `None` once the source is exhausted.
    async fn next_message(&mut self) -> Option<RawMessage>;
}

/// AMQP-style binding pattern: `*` matches one word, `#` zero or more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPattern {
    words: Vec<String>,
}

impl BindingPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            words: pattern.split('.').map(str::to_string).collect(),
        }
    }

    pub fn matches(&self, binding: &str) -> bool {
        let key: Vec<&str> = binding.split('.').collect();
        match_words(&self.words, &key)
    }
}

fn match_words(pattern: &[String], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((head, rest)) if head == "#" => {
            (0..=key.len()).any(|skip| match_words(rest, &key[skip..]))
        }
        Some((head, rest)) => match key.split_first() {
            Some((word, key_rest)) if head == "*" || head == word => match_words(rest, key_rest),
            _ => false,
        },
    }
}

/// Exchange plus binding patterns of one subscriber.
#[derive(Debug, Clone)]
pub struct SubscriptionFilter {
    exchange: String,
    patterns: Vec<BindingPattern>,
}

impl SubscriptionFilter {
    pub fn new(exchange: impl Into<String>, bindings: &[String]) -> Self {
        Self {
            exchange: exchange.into(),
            patterns: bindings.iter().map(|b| BindingPattern::new(b)).collect(),
        }
    }

    pub fn from_config(config: &SubscriberConfig) -> Self {
        Self::new(config.exchange.clone(), &config.bindings)
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn accepts(&self, exchange: &str, binding: &str) -> bool {
        exchange == self.exchange && self.patterns.iter().any(|p| p.matches(binding))
    }
}

/// In-process fan-out bus for embedding applications and tests.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<RawMessage>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(MEMORY_BUS_CAPACITY)
    }
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to every current subscriber. Returns how many received it.
    pub fn publish(&self, exchange: &str, binding: &str, body: impl Into<MessageBody>) -> usize {
        self.sender
            .send(RawMessage::new(exchange, binding, body))
            .unwrap_or(0)
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> MemorySource {
        MemorySource {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct MemorySource {
    receiver: broadcast::Receiver<RawMessage>,
    filter: SubscriptionFilter,
}

#[async_trait]
impl TelemetrySource for MemorySource {
    async fn next_message(&mut self) -> Option<RawMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if self.filter.accepts(&message.exchange, &message.binding) => {
                    return Some(message)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, exchange = %self.filter.exchange(), "Memory subscriber lagged, messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// One line of a newline-delimited telemetry stream.
///
/// A string `body` is treated as raw payload bytes, anything else as
/// already-decoded data.
#[derive(Debug, Deserialize)]
struct Envelope {
    exchange: String,
    binding: String,
    body: Value,
}

/// Line stream that outlives the sources reading from it.
///
/// `next_line` is cancel safe, so aborting a reader mid-read leaves any
/// buffered lines for the next one.
pub type SharedLines<R> = Arc<Mutex<Lines<R>>>;

pub fn shared_lines<R: AsyncBufRead>(reader: R) -> SharedLines<R> {
    Arc::new(Mutex::new(reader.lines()))
}

/// The process has one stdin; every generation of subscribers reads the
/// same buffered stream.
fn stdin_lines() -> SharedLines<BufReader<Stdin>> {
    static STDIN_LINES: OnceLock<SharedLines<BufReader<Stdin>>> = OnceLock::new();
    Arc::clone(STDIN_LINES.get_or_init(|| shared_lines(BufReader::new(tokio::io::stdin()))))
}

/// Source reading JSON envelopes line by line.
pub struct LineSource<R> {
    lines: SharedLines<R>,
    filter: SubscriptionFilter,
    origin: String,
}

impl<R: AsyncBufRead + Unpin + Send> LineSource<R> {
    pub fn new(reader: R, filter: SubscriptionFilter, origin: impl Into<String>) -> Self {
        Self::shared(shared_lines(reader), filter, origin)
    }

    pub fn shared(lines: SharedLines<R>, filter: SubscriptionFilter, origin: impl Into<String>) -> Self {
        Self {
            lines,
            filter,
            origin: origin.into(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TelemetrySource for LineSource<R> {
    async fn next_message(&mut self) -> Option<RawMessage> {
        loop {
            let next = self.lines.lock().await.next_line().await;
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!(origin = %self.origin, "Telemetry stream ended");
                    return None;
                }
                Err(e) => {
                    warn!(origin = %self.origin, error = %e, "Failed to read telemetry stream");
                    return None;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let envelope: Envelope = match serde_json::from_str(line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(origin = %self.origin, error = %e, "Skipping unreadable envelope");
                    continue;
                }
            };
            if !self.filter.accepts(&envelope.exchange, &envelope.binding) {
                continue;
            }
            let body = match envelope.body {
                Value::String(text) => MessageBody::Bytes(text.into_bytes()),
                other => MessageBody::Structured(other),
            };
            return Some(RawMessage {
                exchange: envelope.exchange,
                binding: envelope.binding,
                body,
            });
        }
    }
}

#[cfg(feature = "zenoh-integration")]
pub use zenoh_source::ZenohSource;

#[cfg(feature = "zenoh-integration")]
mod zenoh_source {
    use super::*;
    use zenoh::handlers::FifoChannelHandler;
    use zenoh::pubsub::Subscriber;
    use zenoh::sample::Sample;
    use zenoh::Session;

    pub const DEFAULT_KEY_PREFIX: &str = "wsviz";

    /// Zenoh subscription on `<prefix>/<exchange>/**`.
    ///
    /// The key suffix after the exchange is the binding, e.g.
    /// `wsviz/telemetry/telemetry.robot.arm1`.
    pub struct ZenohSource {
        subscriber: Subscriber<FifoChannelHandler<Sample>>,
        key_base: String,
        filter: SubscriptionFilter,
        _session: Session, // Keep session alive
    }

    impl ZenohSource {
        pub async fn open(key_prefix: Option<&str>, filter: SubscriptionFilter) -> Result<Self> {
            let key_base = format!(
                "{}/{}",
                key_prefix.unwrap_or(DEFAULT_KEY_PREFIX).trim_end_matches('/'),
                filter.exchange()
            );
            let session = zenoh::open(zenoh::Config::default())
                .await
                .map_err(|e| VizError::Connection(format!("Failed to open Zenoh session: {}", e)))?;
            let key_expr = format!("{}/**", key_base);
            let subscriber = session
                .declare_subscriber(key_expr.clone())
                .await
                .map_err(|e| VizError::Connection(format!("Failed to subscribe to {}: {}", key_expr, e)))?;
            info!(key_expr = %key_expr, "Zenoh subscriber declared");
            Ok(Self {
                subscriber,
                key_base,
                filter,
                _session: session,
            })
        }
    }

    #[async_trait]
    impl TelemetrySource for ZenohSource {
        async fn next_message(&mut self) -> Option<RawMessage> {
            loop {
                let sample = match self.subscriber.recv_async().await {
                    Ok(sample) => sample,
                    Err(e) => {
                        warn!(error = %e, "Zenoh subscriber closed");
                        return None;
                    }
                };
                let key = sample.key_expr().as_str();
                let Some(binding) = key
                    .strip_prefix(self.key_base.as_str())
                    .and_then(|rest| rest.strip_prefix('/'))
                else {
                    debug!(key, "Ignoring sample outside subscription base");
                    continue;
                };
                if !self.filter.accepts(self.filter.exchange(), binding) {
                    continue;
                }
                return Some(RawMessage {
                    exchange: self.filter.exchange().to_string(),
                    binding: binding.to_string(),
                    body: MessageBody::Bytes(sample.payload().to_bytes().to_vec()),
                });
            }
        }
    }
}

/// Open the transport a subscriber is configured with.
///
/// Fails when the transport cannot be reached; callers treat that as fatal.
pub async fn connect(config: &SubscriberConfig, bus: Option<&MemoryBus>) -> Result<Box<dyn TelemetrySource>> {
    let filter = SubscriptionFilter::from_config(config);
    let name = config.display_name();
    match &config.transport {
        TransportConfig::Stdin => {
            info!(subscriber = %name, "Reading telemetry from stdin");
            Ok(Box::new(LineSource::shared(stdin_lines(), filter, "stdin")))
        }
        TransportConfig::Replay { path } => {
            let file = tokio::fs::File::open(path).await.map_err(|e| {
                VizError::Connection(format!("Failed to open replay file {}: {}", path.display(), e))
            })?;
            info!(subscriber = %name, path = %path.display(), "Replaying telemetry from file");
            Ok(Box::new(LineSource::new(
                BufReader::new(file),
                filter,
                path.display().to_string(),
            )))
        }
        TransportConfig::Memory => {
            let bus = bus.ok_or_else(|| {
                VizError::Connection(format!("subscriber '{}' uses the memory transport but no bus is attached", name))
            })?;
            debug!(subscriber = %name, "Subscribed to in-process bus");
            Ok(Box::new(bus.subscribe(filter)))
        }
        #[cfg(feature = "zenoh-integration")]
        TransportConfig::Zenoh { key_prefix } => {
            Ok(Box::new(ZenohSource::open(key_prefix.as_deref(), filter).await?))
        }
        #[cfg(not(feature = "zenoh-integration"))]
        TransportConfig::Zenoh { .. } => Err(VizError::Config(format!(
            "subscriber '{}' uses zenoh but wsviz was built without the zenoh-integration feature",
            name
        ))),
    }
}
