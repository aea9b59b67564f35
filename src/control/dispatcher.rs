//! Dispatcher
//!
//! Owns the outbound [`Channel`] and sequences every publish through one lane
//! per topic. A lane is a fair async mutex, so envelopes for the same topic go
//! out in the order their callers acquired it and a one-shot request can never
//! interleave with a re-send of the velocity stream.
//!
//! Continuous commands get a background task that re-publishes the latest
//! arguments every `resend_interval`. When the stream is cancelled (by
//! [`Dispatcher::stop`], by shutdown, or by a stance command that pre-empts it)
//! exactly one halt envelope is published and the task exits.

use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::DispatcherConfig;
use super::builder::RequestBuilder;
use super::call::CommandCall;
use super::catalog::{Catalog, CommandSpec};
use super::channel::Channel;
use super::codec::Arguments;
use super::envelope::{Family, RequestEnvelope};
use super::error::{ConfigError, DispatchError, DispatchResult};

/// Callback receiving errors raised by background stream tasks
pub type StreamErrorHook = Arc<dyn Fn(&str, &DispatchError) + Send + Sync>;

/// Result of a successful [`Dispatcher::send`]
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    /// Envelope that was published
    pub envelope: RequestEnvelope,
    /// Publish attempts needed
    pub attempts: u32,
    /// Stream halted before this envelope went out, if any
    pub preempted: Option<&'static str>,
}

/// Snapshot of a running continuous stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStatus {
    /// Command being streamed
    pub command: &'static str,
    /// Arguments used for the next re-send
    pub arguments: Arguments,
    /// Last successful publish for this stream
    pub last_sent_at: Option<Instant>,
    /// Background re-sends published so far
    pub resends: u64,
    /// Whether a stop is pending
    pub cancelled: bool,
}

/// Coarse state of one topic lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    /// Nothing in flight and no stream running
    Idle,
    /// A publish currently holds the lane
    Sending,
    /// A continuous stream is active
    StreamingContinuous,
    /// The dispatcher has shut down
    Stopped,
}

struct ActiveStream {
    id: u64,
    spec: &'static CommandSpec,
    latest: CommandCall,
    last_sent_at: Option<Instant>,
    resends: u64,
    cancelled: bool,
    wake: Arc<Notify>,
}

impl ActiveStream {
    fn status(&self) -> StreamStatus {
        StreamStatus {
            command: self.spec.name,
            arguments: self.latest.arguments.clone(),
            last_sent_at: self.last_sent_at,
            resends: self.resends,
            cancelled: self.cancelled,
        }
    }
}

#[derive(Default)]
struct Lane {
    stream: Option<ActiveStream>,
}

struct Shared {
    channel: Arc<dyn Channel>,
    builder: RequestBuilder,
    config: DispatcherConfig,
    lanes: HashMap<Family, Mutex<Lane>>,
    on_stream_error: StreamErrorHook,
    closed: AtomicBool,
    next_stream: AtomicU64,
    loops: SyncMutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn lane(&self, family: Family) -> &Mutex<Lane> {
        // Every family gets a lane at construction.
        &self.lanes[&family]
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Publish with bounded exponential backoff
    async fn publish(&self, envelope: &RequestEnvelope) -> DispatchResult<u32> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.channel.publish(envelope).await {
                Ok(()) => {
                    debug!(%envelope, attempt, "published");
                    return Ok(attempt);
                }
                Err(source) if attempt >= max_attempts => {
                    return Err(DispatchError::DispatchFailed {
                        topic: envelope.topic,
                        attempts: attempt,
                        source,
                    });
                }
                Err(err) => {
                    warn!(%envelope, attempt, error = %err, "publish failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff());
                }
            }
        }
    }

    fn report(&self, command: &str, error: &DispatchError) {
        (self.on_stream_error)(command, error);
    }
}

/// Sends command envelopes and keeps continuous commands alive
///
/// Call [`shutdown`](Self::shutdown) and await it before dropping. Dropping
/// without it only flags the streams: their tasks outlive the dispatcher and
/// still publish a halt envelope on their next tick.
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Create a dispatcher over `channel` using the global catalog
    pub fn new(channel: Arc<dyn Channel>, config: DispatcherConfig) -> Result<Self, ConfigError> {
        Self::with_catalog(channel, config, Catalog::global())
    }

    /// Create a dispatcher over `channel` using an explicit catalog
    pub fn with_catalog(
        channel: Arc<dyn Channel>,
        config: DispatcherConfig,
        catalog: &'static Catalog,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let lanes = Family::ALL
            .into_iter()
            .map(|family| (family, Mutex::new(Lane::default())))
            .collect();

        Ok(Self {
            shared: Arc::new(Shared {
                channel,
                builder: RequestBuilder::new(catalog, config.session_id),
                config,
                lanes,
                on_stream_error: Arc::new(|command: &str, error: &DispatchError| {
                    warn!(command, %error, "stream publish failed");
                }),
                closed: AtomicBool::new(false),
                next_stream: AtomicU64::new(1),
                loops: SyncMutex::new(Vec::new()),
            }),
        })
    }

    /// Replace the hook that receives background stream errors
    ///
    /// Must be called before the first send.
    pub fn with_stream_error_hook(mut self, hook: StreamErrorHook) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.on_stream_error = hook,
            None => warn!("stream error hook ignored: dispatcher already running streams"),
        }
        self
    }

    /// Active configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Builder used for every envelope
    pub fn builder(&self) -> &RequestBuilder {
        &self.shared.builder
    }

    /// Invoke a command with a JSON object of arguments
    pub async fn invoke(&self, command: &str, arguments: Value) -> DispatchResult<SendOutcome> {
        let call = CommandCall::from_json(command, arguments)?;
        self.send(call).await
    }

    /// Validate, build and publish a call
    ///
    /// One-shot commands are published once. A stance command first halts any
    /// velocity stream on its topic. Continuous commands start or update the
    /// stream for that command and publish immediately.
    pub async fn send(&self, call: CommandCall) -> DispatchResult<SendOutcome> {
        let shared = &self.shared;
        let spec = shared.builder.catalog().lookup(&call.command)?;
        let envelope = shared.builder.build(&call)?;

        let mut lane = shared.lane(spec.family).lock().await;
        if shared.is_closed() {
            return Err(DispatchError::ShutDown);
        }

        if spec.continuous {
            self.send_continuous(&mut lane, spec, call, envelope).await
        } else {
            self.send_once(&mut lane, spec, envelope).await
        }
    }

    async fn send_once(
        &self,
        lane: &mut Lane,
        spec: &'static CommandSpec,
        envelope: RequestEnvelope,
    ) -> DispatchResult<SendOutcome> {
        let preempted = if spec.preempts_streams() {
            self.halt_stream(lane, spec.name).await?
        } else {
            None
        };

        let attempts = self.shared.publish(&envelope).await?;
        Ok(SendOutcome {
            envelope,
            attempts,
            preempted,
        })
    }

    /// Cancel the lane's stream, if any, and publish its halt envelope inline
    ///
    /// On publish failure the stream stays registered (cancelled), so its task
    /// still owes the robot a halt on the next tick.
    async fn halt_stream(
        &self,
        lane: &mut Lane,
        cause: &str,
    ) -> DispatchResult<Option<&'static str>> {
        let Some(stream) = lane.stream.as_mut() else {
            return Ok(None);
        };
        stream.cancelled = true;
        let name = stream.spec.name;
        info!(stream = name, cause, "stream conflict: halting before one-shot command");

        let halt = self
            .shared
            .builder
            .build_halt(stream.spec, stream.latest.session_id)?;
        self.shared.publish(&halt).await?;

        if let Some(stream) = lane.stream.take() {
            stream.wake.notify_one();
        }
        Ok(Some(name))
    }

    async fn send_continuous(
        &self,
        lane: &mut Lane,
        spec: &'static CommandSpec,
        call: CommandCall,
        envelope: RequestEnvelope,
    ) -> DispatchResult<SendOutcome> {
        let mut preempted = None;
        if lane
            .stream
            .as_ref()
            .is_some_and(|stream| stream.spec.name != spec.name)
        {
            preempted = self.halt_stream(lane, spec.name).await?;
        }

        match lane.stream.as_mut() {
            Some(stream) => {
                if stream.cancelled {
                    debug!(stream = spec.name, "pending stop withdrawn by new call");
                }
                stream.cancelled = false;
                stream.latest = call;
            }
            None => {
                let stream = self.start_stream(spec, call);
                lane.stream = Some(stream);
            }
        }

        let attempts = self.shared.publish(&envelope).await?;
        if let Some(stream) = lane.stream.as_mut() {
            stream.last_sent_at = Some(Instant::now());
        }

        Ok(SendOutcome {
            envelope,
            attempts,
            preempted,
        })
    }

    fn start_stream(&self, spec: &'static CommandSpec, call: CommandCall) -> ActiveStream {
        let id = self.shared.next_stream.fetch_add(1, Ordering::SeqCst);
        let wake = Arc::new(Notify::new());
        info!(stream = spec.name, id, "starting continuous stream");

        let handle = tokio::spawn(run_stream(
            Arc::clone(&self.shared),
            spec.family,
            id,
            Arc::clone(&wake),
        ));

        let mut loops = self.shared.loops.lock();
        loops.retain(|handle| !handle.is_finished());
        loops.push(handle);

        ActiveStream {
            id,
            spec,
            latest: call,
            last_sent_at: None,
            resends: 0,
            cancelled: false,
            wake,
        }
    }

    /// Stop the stream for `command`, if one is running
    ///
    /// The stream task publishes one halt envelope and exits. Calling this for
    /// a command with no stream, or after shutdown, does nothing.
    pub async fn stop(&self, command: &str) -> DispatchResult<()> {
        let spec = self.shared.builder.catalog().lookup(command)?;
        let mut lane = self.shared.lane(spec.family).lock().await;

        if let Some(stream) = lane
            .stream
            .as_mut()
            .filter(|stream| stream.spec.name == spec.name)
        {
            if !stream.cancelled {
                info!(stream = spec.name, "stop requested");
            }
            stream.cancelled = true;
            stream.wake.notify_one();
        }
        Ok(())
    }

    /// Snapshot of the stream for `command`
    pub async fn stream_status(&self, command: &str) -> Option<StreamStatus> {
        let spec = self.shared.builder.catalog().lookup(command).ok()?;
        let lane = self.shared.lane(spec.family).lock().await;
        lane.stream
            .as_ref()
            .filter(|stream| stream.spec.name == spec.name)
            .map(ActiveStream::status)
    }

    /// Coarse state of the lane serving `family`
    pub fn lane_state(&self, family: Family) -> LaneState {
        if self.shared.is_closed() {
            return LaneState::Stopped;
        }
        match self.shared.lane(family).try_lock() {
            Err(_) => LaneState::Sending,
            Ok(lane) if lane.stream.is_some() => LaneState::StreamingContinuous,
            Ok(_) => LaneState::Idle,
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has begun
    pub fn is_shut_down(&self) -> bool {
        self.shared.is_closed()
    }

    /// Cancel every stream and wait for all stream tasks to finish
    ///
    /// Each running stream publishes its halt envelope before this returns.
    /// Later sends fail with [`DispatchError::ShutDown`]. Idempotent.
    pub async fn shutdown(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            info!("dispatcher shutting down");
        }

        for family in Family::ALL {
            let mut lane = self.shared.lane(family).lock().await;
            if let Some(stream) = lane.stream.as_mut() {
                stream.cancelled = true;
                stream.wake.notify_one();
            }
        }

        let handles = std::mem::take(&mut *self.shared.loops.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "stream task ended abnormally");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Stream tasks poll this flag on every tick and halt on their own.
        self.shared.closed.store(true, Ordering::SeqCst);
        for lane in self.shared.lanes.values() {
            if let Ok(mut lane) = lane.try_lock() {
                if let Some(stream) = lane.stream.as_mut() {
                    stream.cancelled = true;
                    stream.wake.notify_one();
                }
            }
        }
    }
}

/// Background re-send task for one stream
async fn run_stream(shared: Arc<Shared>, family: Family, id: u64, wake: Arc<Notify>) {
    let period = shared.config.resend_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wake.notified() => {}
        }

        let mut lane = shared.lane(family).lock().await;
        let Some(stream) = lane.stream.as_mut().filter(|stream| stream.id == id) else {
            debug!(id, "stream superseded, task exiting");
            return;
        };

        if stream.cancelled || shared.is_closed() {
            let spec = stream.spec;
            let session = stream.latest.session_id;
            lane.stream = None;

            let result = match shared.builder.build_halt(spec, session) {
                Ok(halt) => shared.publish(&halt).await.map(|_| ()),
                Err(err) => Err(err.into()),
            };
            if let Err(err) = result {
                shared.report(spec.name, &err);
            }
            info!(stream = spec.name, id, "stream stopped");
            return;
        }

        let envelope = match shared.builder.build(&stream.latest) {
            Ok(envelope) => envelope,
            Err(err) => {
                shared.report(stream.spec.name, &DispatchError::from(err));
                continue;
            }
        };
        match shared.publish(&envelope).await {
            Ok(_) => {
                stream.last_sent_at = Some(Instant::now());
                stream.resends += 1;
            }
            Err(err) => shared.report(stream.spec.name, &err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::channel::RecordingChannel;
    use crate::control::envelope::SPORT_TOPIC;
    use std::time::Duration;

    fn velocity(x: f64) -> CommandCall {
        CommandCall::new("move").arg("x", x).arg("y", 0).arg("z", 0)
    }

    fn dispatcher(channel: &Arc<RecordingChannel>) -> Dispatcher {
        Dispatcher::new(channel.clone(), DispatcherConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_publishes_once() {
        let channel = Arc::new(RecordingChannel::new());
        let dispatcher = dispatcher(&channel);

        let outcome = dispatcher.send(CommandCall::new("standUp")).await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.preempted, None);
        assert_eq!(channel.envelopes(), vec![outcome.envelope]);
        assert_eq!(dispatcher.lane_state(Family::Sport), LaneState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_update_reuses_stream() {
        let channel = Arc::new(RecordingChannel::new());
        let dispatcher = dispatcher(&channel);

        dispatcher.send(velocity(0.1)).await.unwrap();
        dispatcher.send(velocity(0.4)).await.unwrap();
        assert_eq!(dispatcher.shared.loops.lock().len(), 1);
        assert_eq!(
            dispatcher.lane_state(Family::Sport),
            LaneState::StreamingContinuous
        );

        let status = dispatcher.stream_status("move").await.unwrap();
        assert_eq!(status.arguments["x"], serde_json::json!(0.4));
        assert!(!status.cancelled);

        tokio::time::sleep(Duration::from_millis(120)).await;
        let last = channel.envelopes().pop().unwrap();
        assert_eq!(last.parameter, r#"{"x":0.4,"y":0,"z":0}"#);

        dispatcher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_succeed() {
        let channel = Arc::new(RecordingChannel::new());
        let dispatcher = dispatcher(&channel);

        channel.fail_next(2);
        let outcome = dispatcher.send(CommandCall::new("sitDown")).await.unwrap();
        assert_eq!(outcome.attempts, 3);
        assert_eq!(channel.attempts(), 3);
        assert_eq!(channel.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_dispatch_failed() {
        let channel = Arc::new(RecordingChannel::new());
        let dispatcher = dispatcher(&channel);

        channel.fail_next(3);
        let err = dispatcher.send(CommandCall::new("hello")).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::DispatchFailed { topic: SPORT_TOPIC, attempts: 3, .. }
        ));
        assert!(channel.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_adjustment_does_not_preempt_stream() {
        let channel = Arc::new(RecordingChannel::new());
        let dispatcher = dispatcher(&channel);

        dispatcher.send(velocity(0.2)).await.unwrap();
        let outcome = dispatcher
            .send(CommandCall::new("euler").arg("x", 0).arg("y", 0.1).arg("z", 0))
            .await
            .unwrap();
        assert_eq!(outcome.preempted, None);
        assert!(dispatcher.stream_status("move").await.is_some());

        dispatcher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_stream_is_noop() {
        let channel = Arc::new(RecordingChannel::new());
        let dispatcher = dispatcher(&channel);

        dispatcher.stop("move").await.unwrap();
        dispatcher.stop("move").await.unwrap();
        assert!(channel.is_empty());
        assert!(matches!(
            dispatcher.stop("danc3").await,
            Err(DispatchError::Catalog(_))
        ));
    }
}
