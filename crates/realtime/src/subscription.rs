//! Debounced subscription with automatic reconnection.
//!
//! Each subscription runs as one tokio task (the driver) that exclusively
//! owns the channel link, any in-flight open and every timer. All state
//! changes happen inside that task; the [`SubscriptionHandle`] only sends
//! commands and reads the published [`ConnectionState`].
//!
//! Opening a channel is one more branch of the driver's `select!`, so
//! commands and the debounce deadline are served while a connect is in
//! flight. Disabling or closing drops the unfinished open.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, error, info, warn};

use crate::backoff::{Backoff, BackoffPolicy};
use crate::channel::{ChangePayload, ChannelSpec, TableWatch};
use crate::error::RealtimeError;
use crate::state::ConnectionState;
use crate::transport::{ChannelEvent, ChannelLink, RealtimeTransport};

/// Default quiet period before a burst of changes is delivered.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Default time allowed for the subscribe handshake.
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// What to subscribe to and how to behave.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    pub channel: String,
    pub tables: Vec<TableWatch>,
    pub debounce: Duration,
    pub enabled: bool,
    pub backoff: BackoffPolicy,
    pub subscribe_timeout: Duration,
}

impl SubscriptionOptions {
    /// Options for `channel` with defaults: 300 ms debounce, enabled,
    /// 1 s/30 s/5 backoff, 10 s subscribe timeout, no tables yet.
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            tables: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
            enabled: true,
            backoff: BackoffPolicy::default(),
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn watch(mut self, table: TableWatch) -> Self {
        self.tables.push(table);
        self
    }

    #[must_use]
    pub const fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub const fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    #[must_use]
    pub const fn subscribe_timeout(mut self, limit: Duration) -> Self {
        self.subscribe_timeout = limit;
        self
    }

    fn spec(&self) -> ChannelSpec {
        ChannelSpec {
            name: self.channel.clone(),
            tables: self.tables.clone(),
        }
    }
}

#[derive(Debug)]
enum Command {
    Reconnect,
    SetEnabled(bool),
    Shutdown,
}

/// Entry point for starting subscriptions.
pub struct RealtimeSubscription;

impl RealtimeSubscription {
    /// Start a subscription. `on_change` runs on the driver task with the
    /// last change of each burst.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(
        transport: Arc<dyn RealtimeTransport>,
        options: SubscriptionOptions,
        on_change: F,
    ) -> SubscriptionHandle
    where
        F: FnMut(ChangePayload) + Send + 'static,
    {
        if let Err(e) = validate(&options) {
            error!(error = %e, "realtime subscription will never see a change");
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let driver = Driver {
            transport,
            spec: options.spec(),
            debounce: options.debounce,
            subscribe_timeout: options.subscribe_timeout,
            backoff: Backoff::new(options.backoff),
            enabled: options.enabled,
            link: None,
            opening: None,
            pending: None,
            retry_at: None,
            ack_deadline: None,
            state: state_tx,
            on_change,
        };
        let task = tokio::spawn(driver.run(command_rx));

        SubscriptionHandle {
            commands: command_tx,
            state: state_rx,
            task: Some(task),
        }
    }
}

/// Control surface for a running subscription.
///
/// Dropping the handle stops the driver immediately: the pending debounce
/// is discarded and the channel is released.
#[derive(Debug)]
pub struct SubscriptionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Drop any current link and connect again with a fresh retry budget.
    /// This is the way out of [`ConnectionState::Exhausted`].
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Enable or disable the subscription. Disabling releases the channel
    /// and cancels pending timers without scheduling a reconnect.
    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.commands.send(Command::SetEnabled(enabled));
    }

    /// Stop the subscription and wait for the driver to release the channel.
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            error!(error = %e, "realtime driver panicked");
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

type Opening = BoxFuture<'static, Result<ChannelLink, RealtimeError>>;

struct PendingChange {
    payload: ChangePayload,
    deadline: Instant,
}

struct Driver<F> {
    transport: Arc<dyn RealtimeTransport>,
    spec: ChannelSpec,
    debounce: Duration,
    subscribe_timeout: Duration,
    backoff: Backoff,
    enabled: bool,
    link: Option<ChannelLink>,
    opening: Option<Opening>,
    pending: Option<PendingChange>,
    retry_at: Option<Instant>,
    ack_deadline: Option<Instant>,
    state: watch::Sender<ConnectionState>,
    on_change: F,
}

impl<F> Driver<F>
where
    F: FnMut(ChangePayload) + Send + 'static,
{
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        if self.enabled {
            self.connect();
        }

        loop {
            let debounce_at = self.pending.as_ref().map(|p| p.deadline);

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(Command::Reconnect) => self.manual_reconnect(),
                    Some(Command::SetEnabled(enabled)) => self.set_enabled(enabled),
                },
                opened = next_open(&mut self.opening) => {
                    self.opening = None;
                    self.on_opened(opened);
                }
                event = next_event(&mut self.link) => self.on_event(event),
                () = sleep_until_some(debounce_at) => self.flush(),
                () = sleep_until_some(self.ack_deadline) => {
                    self.on_failure("subscribe acknowledgement timed out");
                }
                () = sleep_until_some(self.retry_at) => {
                    self.retry_at = None;
                    self.connect();
                }
            }
        }

        self.teardown();
    }

    /// Start opening the channel. The result arrives in [`Self::on_opened`].
    fn connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
        let transport = Arc::clone(&self.transport);
        let spec = self.spec.clone();
        let limit = self.subscribe_timeout;
        self.opening = Some(Box::pin(async move {
            timeout(limit, transport.open(&spec)).await.unwrap_or_else(|_| {
                Err(RealtimeError::Connect(
                    "timed out opening channel".to_string(),
                ))
            })
        }));
    }

    fn on_opened(&mut self, opened: Result<ChannelLink, RealtimeError>) {
        match opened {
            Ok(link) => {
                self.link = Some(link);
                self.ack_deadline = Some(Instant::now() + self.subscribe_timeout);
            }
            Err(e) => self.on_failure(&e.to_string()),
        }
    }

    fn on_event(&mut self, event: Option<ChannelEvent>) {
        match event {
            Some(ChannelEvent::Subscribed) => {
                self.ack_deadline = None;
                self.backoff.reset();
                self.set_state(ConnectionState::Connected);
                info!(channel = %self.spec.name, "realtime channel subscribed");
            }
            Some(ChannelEvent::Change(payload)) => {
                debug!(
                    channel = %self.spec.name,
                    table = %payload.table,
                    kind = %payload.kind,
                    "change received"
                );
                self.pending = Some(PendingChange {
                    payload,
                    deadline: Instant::now() + self.debounce,
                });
            }
            Some(ChannelEvent::Error(reason)) => self.on_failure(&reason),
            Some(ChannelEvent::Closed) => {
                self.release_link();
                self.ack_deadline = None;
                self.set_state(ConnectionState::Disconnected);
                info!(channel = %self.spec.name, "realtime channel closed by server");
            }
            None => self.on_failure("transport stream ended"),
        }
    }

    fn on_failure(&mut self, reason: &str) {
        self.opening = None;
        self.release_link();
        self.ack_deadline = None;

        if let Some(delay) = self.backoff.next_delay() {
            let attempt = self.backoff.attempt();
            warn!(
                channel = %self.spec.name,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                reason,
                "realtime channel failed, scheduling reconnect"
            );
            self.retry_at = Some(Instant::now() + delay);
            self.set_state(ConnectionState::Reconnecting { attempt });
        } else {
            error!(
                channel = %self.spec.name,
                attempts = self.backoff.attempt(),
                reason,
                "realtime channel gave up reconnecting"
            );
            self.retry_at = None;
            self.set_state(ConnectionState::Exhausted);
        }
    }

    fn manual_reconnect(&mut self) {
        if !self.enabled {
            warn!(channel = %self.spec.name, "ignoring reconnect while disabled");
            return;
        }
        info!(channel = %self.spec.name, "manual reconnect requested");
        self.opening = None;
        self.release_link();
        self.retry_at = None;
        self.ack_deadline = None;
        self.backoff.reset();
        self.connect();
    }

    fn set_enabled(&mut self, enabled: bool) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            info!(channel = %self.spec.name, "realtime subscription enabled");
            self.backoff.reset();
            self.connect();
        } else {
            info!(channel = %self.spec.name, "realtime subscription disabled");
            self.teardown();
        }
    }

    fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            (self.on_change)(pending.payload);
        }
    }

    /// Cancel every timer, abandon any open in flight and release the link.
    fn teardown(&mut self) {
        self.opening = None;
        self.pending = None;
        self.retry_at = None;
        self.ack_deadline = None;
        self.release_link();
        self.set_state(ConnectionState::Disconnected);
    }

    fn release_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.release();
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(channel = %self.spec.name, from = %previous, to = %next, "connection state");
        }
    }
}

async fn next_event(link: &mut Option<ChannelLink>) -> Option<ChannelEvent> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_open(opening: &mut Option<Opening>) -> Result<ChannelLink, RealtimeError> {
    match opening {
        Some(opening) => opening.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Validate options before spawning.
///
/// # Errors
///
/// Returns [`RealtimeError::NothingToWatch`] if no tables are configured.
pub fn validate(options: &SubscriptionOptions) -> Result<(), RealtimeError> {
    if options.tables.is_empty() {
        return Err(RealtimeError::NothingToWatch(options.channel.clone()));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::channel::ChangeKind;

    /// Transport whose channels are driven by the test.
    #[derive(Default)]
    struct ScriptedTransport {
        senders: Mutex<Vec<mpsc::Sender<ChannelEvent>>>,
        opens: AtomicUsize,
        releases: Arc<AtomicUsize>,
        refuse: AtomicBool,
        stall: AtomicBool,
    }

    impl ScriptedTransport {
        fn latest(&self) -> mpsc::Sender<ChannelEvent> {
            self.senders.lock().unwrap().last().cloned().unwrap()
        }

        async fn emit(&self, event: ChannelEvent) {
            self.latest().send(event).await.unwrap();
        }
    }

    #[async_trait]
    impl RealtimeTransport for ScriptedTransport {
        async fn open(&self, _spec: &ChannelSpec) -> Result<ChannelLink, RealtimeError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.stall.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.refuse.load(Ordering::SeqCst) {
                return Err(RealtimeError::Connect("refused".to_string()));
            }
            let (tx, rx) = mpsc::channel(64);
            self.senders.lock().unwrap().push(tx);
            let releases = Arc::clone(&self.releases);
            Ok(ChannelLink::new(rx, move || {
                releases.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    fn change(n: u64) -> ChangePayload {
        ChangePayload {
            schema: "public".to_string(),
            table: "orders".to_string(),
            kind: ChangeKind::Update,
            commit_timestamp: None,
            record: serde_json::json!({ "id": n.to_string() }),
            old_record: serde_json::Value::Null,
        }
    }

    fn options() -> SubscriptionOptions {
        SubscriptionOptions::new("test").watch(TableWatch::new("orders"))
    }

    type Seen = Arc<Mutex<Vec<ChangePayload>>>;

    fn start(transport: &Arc<ScriptedTransport>, options: SubscriptionOptions) -> (SubscriptionHandle, Seen) {
        let seen: Seen = Arc::default();
        let sink = Arc::clone(&seen);
        let handle = RealtimeSubscription::spawn(
            Arc::clone(transport) as Arc<dyn RealtimeTransport>,
            options,
            move |payload| sink.lock().unwrap().push(payload),
        );
        (handle, seen)
    }

    /// Let the driver run everything that is ready without moving the clock
    /// past any timer.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_and_ack() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, _) = start(&transport, options());
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Connecting);

        transport.emit(ChannelEvent::Subscribed).await;
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_start_stays_disconnected() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, _) = start(&transport, options().enabled(false));
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 0);

        handle.set_enabled(true);
        settle().await;
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_delivers_last_payload_once() {
        let transport = Arc::new(ScriptedTransport::default());
        let (_handle, seen) = start(&transport, options());
        settle().await;
        transport.emit(ChannelEvent::Subscribed).await;

        for n in 0..5 {
            transport.emit(ChannelEvent::Change(change(n))).await;
            settle().await;
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::advance(Duration::from_millis(300)).await;
        settle().await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].row_id(), Some("4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_schedules_backoff() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, _) = start(&transport, options());
        settle().await;
        transport.emit(ChannelEvent::Subscribed).await;
        transport
            .emit(ChannelEvent::Error("socket reset".to_string()))
            .await;
        settle().await;

        assert_eq!(handle.state(), ConnectionState::Reconnecting { attempt: 1 });
        assert_eq!(transport.releases.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(999)).await;
        settle().await;
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(transport.opens.load(Ordering::SeqCst), 2);
        assert_eq!(handle.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_five_retries() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.refuse.store(true, Ordering::SeqCst);
        let (handle, _) = start(&transport, options());
        settle().await;

        for k in 1..=5_u32 {
            assert_eq!(handle.state(), ConnectionState::Reconnecting { attempt: k });
            tokio::time::advance(BackoffPolicy::default().delay_for(k - 1)).await;
            settle().await;
        }
        assert_eq!(handle.state(), ConnectionState::Exhausted);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 6);

        tokio::time::advance(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(transport.opens.load(Ordering::SeqCst), 6);

        transport.refuse.store(false, Ordering::SeqCst);
        handle.reconnect();
        settle().await;
        transport.emit(ChannelEvent::Subscribed).await;
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_mid_reconnect_cancels_everything() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, seen) = start(&transport, options());
        settle().await;
        transport.emit(ChannelEvent::Subscribed).await;
        transport.emit(ChannelEvent::Change(change(1))).await;
        transport
            .emit(ChannelEvent::Error("boom".to_string()))
            .await;
        settle().await;
        assert!(matches!(handle.state(), ConnectionState::Reconnecting { .. }));

        handle.set_enabled(false);
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_close_does_not_reconnect() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, _) = start(&transport, options());
        settle().await;
        transport.emit(ChannelEvent::Subscribed).await;
        transport.emit(ChannelEvent::Closed).await;
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ack_counts_as_failure() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, _) = start(&transport, options());
        settle().await;

        tokio::time::advance(DEFAULT_SUBSCRIBE_TIMEOUT).await;
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Reconnecting { attempt: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_releases_once_and_drops_pending() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, seen) = start(&transport, options());
        settle().await;
        transport.emit(ChannelEvent::Subscribed).await;
        transport.emit(ChannelEvent::Change(change(1))).await;
        settle().await;

        handle.close().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;

        assert_eq!(transport.releases.load(Ordering::SeqCst), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_link() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, _) = start(&transport, options());
        settle().await;
        drop(handle);
        settle().await;
        assert_eq!(transport.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_fires_while_open_is_in_flight() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, seen) =
            start(&transport, options().debounce(Duration::from_secs(2)));
        settle().await;
        transport.emit(ChannelEvent::Subscribed).await;
        transport.emit(ChannelEvent::Change(change(7))).await;
        transport
            .emit(ChannelEvent::Error("socket reset".to_string()))
            .await;
        settle().await;

        // The retry at 1 s hangs inside the transport
        transport.stall.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(transport.opens.load(Ordering::SeqCst), 2);
        assert_eq!(handle.state(), ConnectionState::Connecting);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].row_id(), Some("7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_abandons_open_in_flight() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.stall.store(true, Ordering::SeqCst);
        let (handle, _) = start(&transport, options());
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Connecting);

        handle.set_enabled(false);
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);

        // The abandoned open never times out into a retry
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
        assert_eq!(transport.releases.load(Ordering::SeqCst), 0);

        transport.stall.store(false, Ordering::SeqCst);
        handle.set_enabled(true);
        settle().await;
        transport.emit(ChannelEvent::Subscribed).await;
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replaces_open_in_flight() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.stall.store(true, Ordering::SeqCst);
        let (handle, _) = start(&transport, options());
        settle().await;

        transport.stall.store(false, Ordering::SeqCst);
        handle.reconnect();
        settle().await;
        assert_eq!(transport.opens.load(Ordering::SeqCst), 2);
        transport.emit(ChannelEvent::Subscribed).await;
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_while_reconnecting_keeps_single_release() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, _) = start(&transport, options());
        settle().await;
        transport.emit(ChannelEvent::Subscribed).await;
        transport
            .emit(ChannelEvent::Error("socket reset".to_string()))
            .await;
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Reconnecting { attempt: 1 });
        assert_eq!(transport.releases.load(Ordering::SeqCst), 1);

        drop(handle);
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(transport.releases.load(Ordering::SeqCst), 1);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_while_reconnecting_keeps_single_release() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, _) = start(&transport, options());
        settle().await;
        transport.emit(ChannelEvent::Subscribed).await;
        transport
            .emit(ChannelEvent::Error("socket reset".to_string()))
            .await;
        settle().await;

        handle.close().await;
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(transport.releases.load(Ordering::SeqCst), 1);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_when_exhausted_releases_nothing_more() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, _) = start(&transport, options().subscribe_timeout(Duration::from_secs(1)));

        // Never acknowledged: every link times out and is released
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Exhausted);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 6);
        assert_eq!(transport.releases.load(Ordering::SeqCst), 6);

        handle.close().await;
        settle().await;
        assert_eq!(transport.releases.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_when_exhausted_releases_nothing_more() {
        let transport = Arc::new(ScriptedTransport::default());
        let (handle, _) = start(&transport, options().subscribe_timeout(Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(handle.state(), ConnectionState::Exhausted);

        drop(handle);
        settle().await;
        assert_eq!(transport.releases.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_validate_requires_tables() {
        assert!(validate(&SubscriptionOptions::new("empty")).is_err());
        assert!(validate(&options()).is_ok());
    }
}
