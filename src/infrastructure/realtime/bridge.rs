//! Real-time event bridge
//!
//! Keeps one push channel open for the lifetime of the client and fans
//! parsed events out to subscribers. A dropped channel is retried after a
//! fixed backoff with no attempt limit. A polling loop runs next to it
//! regardless of channel state so that events missed during an outage
//! still arrive.

use crate::config::RealtimeConfig;
use crate::domain::realtime::RealtimeEvent;
use crate::domain::transport::ProviderTransport;
use crate::infrastructure::metrics;
use crate::infrastructure::realtime::channel::PushChannel;
use crate::infrastructure::realtime::wire::parse_frame;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Every this many polls the full message list is fetched instead of the
/// increment since the previous poll
const FULL_POLL_EVERY: u32 = 10;

/// Shortest poll period the bridge will run with
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub reconnect_backoff: Duration,
    pub poll_interval: Duration,
    pub event_buffer: usize,
}

impl From<&RealtimeConfig> for BridgeConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            reconnect_backoff: config.reconnect_backoff(),
            poll_interval: config.poll_interval(),
            event_buffer: config.event_buffer,
        }
    }
}

/// Handles of the two background loops
pub struct BridgeHandle {
    channel_task: JoinHandle<()>,
    poll_task: JoinHandle<()>,
}

impl BridgeHandle {
    /// Stop both loops
    pub fn shutdown(self) {
        self.channel_task.abort();
        self.poll_task.abort();
        info!("Realtime bridge stopped");
    }
}

pub struct RealtimeEventBridge {
    channel: Arc<dyn PushChannel>,
    transport: Arc<dyn ProviderTransport>,
    config: BridgeConfig,
    tx: broadcast::Sender<RealtimeEvent>,
    state_tx: watch::Sender<ChannelState>,
}

impl RealtimeEventBridge {
    pub fn new(
        channel: Arc<dyn PushChannel>,
        transport: Arc<dyn ProviderTransport>,
        mut config: BridgeConfig,
    ) -> Self {
        if config.poll_interval < MIN_POLL_INTERVAL {
            warn!("Poll interval {:?} too short, using {:?}", config.poll_interval, MIN_POLL_INTERVAL);
            config.poll_interval = MIN_POLL_INTERVAL;
        }
        let (tx, _) = broadcast::channel(config.event_buffer.max(1));
        let (state_tx, _) = watch::channel(ChannelState::Disconnected);
        Self {
            channel,
            transport,
            config,
            tx,
            state_tx,
        }
    }

    /// Subscribe to parsed events
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    /// Watch channel state changes
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    /// Spawn the channel and poll loops
    pub fn start(self: &Arc<Self>) -> BridgeHandle {
        info!(
            "Starting realtime bridge (backoff {:?}, poll every {:?})",
            self.config.reconnect_backoff, self.config.poll_interval
        );
        let channel_task = tokio::spawn(Arc::clone(self).run_channel());
        let poll_task = tokio::spawn(Arc::clone(self).run_poller());
        BridgeHandle {
            channel_task,
            poll_task,
        }
    }

    /// Broadcast an event to all subscribers
    pub fn publish(&self, event: RealtimeEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            debug!("No subscribers for {}", name);
        }
    }

    /// Parse one frame and publish it. Malformed frames are dropped.
    pub(crate) fn handle_frame(&self, text: &str) {
        match parse_frame(text) {
            Ok(Some(event)) => {
                debug!("Push event {}", event.name());
                self.publish(event);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Dropping malformed push frame: {}", e);
                metrics::record_dropped_event();
            }
        }
    }

    fn set_state(&self, state: ChannelState) {
        self.state_tx.send_replace(state);
        metrics::set_channel_connected(state == ChannelState::Connected);
    }

    async fn run_channel(self: Arc<Self>) {
        loop {
            self.set_state(ChannelState::Connecting);

            match self.channel.connect().await {
                Ok(mut frames) => {
                    self.set_state(ChannelState::Connected);
                    info!("Push channel connected");

                    while let Some(frame) = frames.next().await {
                        match frame {
                            Ok(text) => self.handle_frame(&text),
                            Err(e) => {
                                warn!("Push channel lost: {}", e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Push channel connect failed: {}", e);
                }
            }

            self.set_state(ChannelState::Disconnected);
            sleep(self.config.reconnect_backoff).await;
            metrics::record_reconnect();
            info!("Reconnecting push channel");
        }
    }

    async fn run_poller(self: Arc<Self>) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut since: Option<DateTime<Utc>> = None;
        let mut polls: u32 = 0;

        loop {
            ticker.tick().await;
            let started = Utc::now();
            let query = if polls % FULL_POLL_EVERY == 0 { None } else { since };
            polls = polls.wrapping_add(1);

            match self.transport.list_messages(query).await {
                Ok(messages) => {
                    metrics::record_poll(true);
                    debug!("Poll returned {} messages", messages.len());
                    since = Some(started - self.lookback());
                    if !messages.is_empty() {
                        self.publish(RealtimeEvent::MessagesPolled { messages });
                    }
                }
                Err(e) => {
                    metrics::record_poll(false);
                    warn!("Message poll failed: {}", e);
                }
            }
        }
    }

    /// Overlap between consecutive polls
    fn lookback(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.poll_interval * 2)
            .unwrap_or_else(|_| chrono::Duration::minutes(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::Message;
    use crate::domain::transport::{MockProviderTransport, TransportError};
    use crate::infrastructure::realtime::channel::{ChannelError, FrameStream};
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::timeout;

    /// Replays one scripted frame list per connection, then fails to connect
    struct ScriptedChannel {
        scripts: Mutex<VecDeque<Vec<Result<String, ChannelError>>>>,
        connects: AtomicUsize,
    }

    impl ScriptedChannel {
        fn new(scripts: Vec<Vec<Result<String, ChannelError>>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                connects: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PushChannel for ScriptedChannel {
        async fn connect(&self) -> Result<FrameStream, ChannelError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.scripts.lock().unwrap().pop_front() {
                Some(frames) => Ok(stream::iter(frames).boxed()),
                None => Err(ChannelError::Connect("refused".to_string())),
            }
        }
    }

    fn quiet_transport() -> MockProviderTransport {
        let mut transport = MockProviderTransport::new();
        transport.expect_list_messages().returning(|_| Ok(vec![]));
        transport
    }

    fn config(backoff_ms: u64, poll_ms: u64) -> BridgeConfig {
        BridgeConfig {
            reconnect_backoff: Duration::from_millis(backoff_ms),
            poll_interval: Duration::from_millis(poll_ms),
            event_buffer: 16,
        }
    }

    fn ended(sid: &str) -> String {
        format!(r#"{{"type":"call_ended","call_sid":"{}"}}"#, sid)
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let channel = Arc::new(ScriptedChannel::new(vec![vec![
            Ok("{broken".to_string()),
            Ok(r#"{"type":"ping"}"#.to_string()),
            Ok(ended("CA1")),
        ]]));
        let bridge = Arc::new(RealtimeEventBridge::new(
            channel,
            Arc::new(quiet_transport()),
            config(10_000, 60_000),
        ));
        let mut rx = bridge.subscribe();
        let handle = bridge.start();

        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(
            event,
            RealtimeEvent::CallEnded {
                provider_sid: "CA1".to_string()
            }
        );
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_reconnects_after_close_and_failures() {
        let channel = Arc::new(ScriptedChannel::new(vec![
            vec![Ok(ended("CA1")), Err(ChannelError::Closed)],
            vec![Ok(ended("CA2"))],
        ]));
        let bridge = Arc::new(RealtimeEventBridge::new(
            channel.clone(),
            Arc::new(quiet_transport()),
            config(20, 60_000),
        ));
        let mut rx = bridge.subscribe();
        let handle = bridge.start();

        let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(first, RealtimeEvent::CallEnded { ref provider_sid } if provider_sid == "CA1"));
        assert!(matches!(second, RealtimeEvent::CallEnded { ref provider_sid } if provider_sid == "CA2"));

        // Scripts are exhausted; connect keeps being retried
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(channel.connects.load(Ordering::SeqCst) >= 4);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_state_is_observable() {
        let channel = Arc::new(ScriptedChannel::new(vec![]));
        let bridge = Arc::new(RealtimeEventBridge::new(
            channel,
            Arc::new(quiet_transport()),
            config(50, 60_000),
        ));
        assert_eq!(bridge.state(), ChannelState::Disconnected);

        let mut states = bridge.watch_state();
        let handle = bridge.start();
        timeout(Duration::from_secs(2), states.changed()).await.unwrap().unwrap();
        assert_ne!(*states.borrow(), ChannelState::Connected);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_poll_runs_while_disconnected() {
        let mut transport = MockProviderTransport::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        transport.expect_list_messages().returning(move |since| {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                assert!(since.is_none());
                return Err(TransportError::Request("offline".to_string()));
            }
            Ok(vec![Message::optimistic("+15550001", "+15550199", "hi", Utc::now())])
        });

        let bridge = Arc::new(RealtimeEventBridge::new(
            Arc::new(ScriptedChannel::new(vec![])),
            Arc::new(transport),
            config(10_000, 20),
        ));
        let mut rx = bridge.subscribe();
        let handle = bridge.start();

        let event = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        match event {
            RealtimeEvent::MessagesPolled { messages } => assert_eq!(messages.len(), 1),
            other => panic!("Wrong event type: {:?}", other),
        }
        assert!(calls.load(Ordering::SeqCst) >= 2);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_poll_periodically_lists_everything() {
        let mut transport = MockProviderTransport::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        transport.expect_list_messages().returning(move |since| {
            record.lock().unwrap().push(since.is_none());
            Ok(vec![])
        });

        let bridge = Arc::new(RealtimeEventBridge::new(
            Arc::new(ScriptedChannel::new(vec![])),
            Arc::new(transport),
            config(10_000, 2),
        ));
        let handle = bridge.start();
        timeout(Duration::from_secs(2), async {
            while seen.lock().unwrap().len() <= FULL_POLL_EVERY as usize {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        handle.shutdown();

        let full: Vec<bool> = seen.lock().unwrap()[..=FULL_POLL_EVERY as usize].to_vec();
        assert!(full[0]);
        assert!(full[1..FULL_POLL_EVERY as usize].iter().all(|f| !f));
        assert!(full[FULL_POLL_EVERY as usize]);
    }

    #[tokio::test]
    async fn test_zero_poll_interval_is_raised() {
        let bridge = RealtimeEventBridge::new(
            Arc::new(ScriptedChannel::new(vec![])),
            Arc::new(quiet_transport()),
            config(10_000, 0),
        );
        assert_eq!(bridge.config.poll_interval, MIN_POLL_INTERVAL);
    }
}
