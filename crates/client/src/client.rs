// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The sync client: public handle plus the driver task that owns all state.
//!
//! The driver serializes everything onto one logical executor: user calls
//! arrive as commands over a channel, inbound frames come off the
//! transport, and reconnect/auth-refresh timers tick, all through a single
//! `tokio::select!` loop. No component is ever touched from two tasks, so
//! state transitions are atomic with respect to callbacks.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ripple_core::{
    ClientMessage, FunctionResult, QueryToken, RequestId, ServerMessage, StateModification,
    Timestamp, UdfPath, Value,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::{AuthChangeCallback, AuthDirective, AuthManager, AuthTokenFetcher};
use crate::error::{ClientError, Result};
use crate::local_state::LocalSyncState;
use crate::marks::MarkCollector;
use crate::optimistic::{OptimisticQueryResults, OptimisticUpdateFn};
use crate::remote_set::RemoteQuerySet;
use crate::requests::{RequestKind, RequestManager};
use crate::socket::{Socket, WebSocketSocket};
use crate::transport::{SocketState, Transport, TransportConfig, TransportEvent};
use crate::url::sync_url;

/// A disconnect longer than this is worth a telemetry event.
const LONG_DISCONNECT_SECS: u64 = 60;

/// Observer invoked with the set of query tokens whose visible result
/// changed. Runs on the driver task; keep it cheap.
pub type TransitionCallback = Box<dyn FnMut(&BTreeSet<QueryToken>) + Send>;

/// Construction-time options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Log every frame at debug level.
    pub verbose: bool,
    /// Collect performance marks and send reconnect telemetry.
    pub report_debug_info: bool,
    /// Browser-host-only page-unload interception. This host has no unload
    /// hook, so enabling it is a construction error rather than a silent
    /// no-op.
    pub unsaved_changes_warning: Option<bool>,
    /// Initial reconnect backoff delay.
    pub initial_delay: Duration,
    /// Reconnect backoff cap.
    pub max_delay: Duration,
    /// Connections surviving this long reset the backoff schedule.
    pub stable_connection: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            verbose: false,
            report_debug_info: false,
            unsaved_changes_warning: None,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            stable_connection: Duration::from_secs(10),
        }
    }
}

/// Snapshot of the client's connection health.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub is_websocket_connected: bool,
    pub socket_state: SocketState,
    pub connection_count: u32,
    pub has_inflight_requests: bool,
    pub has_incomplete_requests: bool,
    pub time_of_oldest_inflight_request: Option<DateTime<Utc>>,
    pub fatal_error: Option<String>,
}

/// An active query subscription.
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) releases one
/// reference; when the last reference goes, the query leaves the set.
#[derive(Debug)]
pub struct Subscription {
    token: QueryToken,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    /// Canonical identity of the subscribed (path, args) pair.
    pub fn query_token(&self) -> &QueryToken {
        &self.token
    }

    /// Release this subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self
            .command_tx
            .send(Command::Unsubscribe { token: self.token.clone() });
    }
}

enum Command {
    Subscribe {
        udf_path: UdfPath,
        args: Value,
        journal: Option<String>,
        reply: oneshot::Sender<Result<QueryToken>>,
    },
    Unsubscribe {
        token: QueryToken,
    },
    Mutation {
        udf_path: UdfPath,
        args: Value,
        optimistic: Option<OptimisticUpdateFn>,
        sender: oneshot::Sender<Result<Value>>,
    },
    Action {
        udf_path: UdfPath,
        args: Value,
        sender: oneshot::Sender<Result<Value>>,
    },
    LocalQueryResult {
        udf_path: UdfPath,
        args: Value,
        reply: oneshot::Sender<Result<Option<Value>>>,
    },
    QueryJournal {
        udf_path: UdfPath,
        args: Value,
        reply: oneshot::Sender<Option<String>>,
    },
    SetAuth {
        fetcher: Box<dyn AuthTokenFetcher>,
        on_change: AuthChangeCallback,
    },
    ClearAuth,
    ConnectionState {
        reply: oneshot::Sender<ConnectionState>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running sync client.
///
/// Cloneable; all clones talk to the same driver task. The connection is
/// established (and re-established) in the background; calls made while
/// disconnected are queued or replayed per their semantics.
#[derive(Clone)]
pub struct SyncClient {
    command_tx: mpsc::UnboundedSender<Command>,
}

impl SyncClient {
    /// Connect to a deployment over a real WebSocket.
    pub fn new(
        address: &str,
        on_transition: TransitionCallback,
        options: ClientOptions,
    ) -> Result<Self> {
        Self::with_socket(address, WebSocketSocket::new(), on_transition, options)
    }

    /// Connect with an injected socket implementation. This is the
    /// extension point tests use to drive the client deterministically.
    pub fn with_socket<S: Socket + 'static>(
        address: &str,
        socket: S,
        on_transition: TransitionCallback,
        options: ClientOptions,
    ) -> Result<Self> {
        if options.unsaved_changes_warning == Some(true) {
            return Err(ClientError::Misuse(
                "unsaved_changes_warning requires a browser host with an unload hook".to_string(),
            ));
        }
        let url = sync_url(address)?;
        let session_id = uuid::Uuid::new_v4().to_string();

        let transport_config = TransportConfig {
            initial_delay: options.initial_delay,
            max_delay: options.max_delay,
            stable_for: options.stable_connection,
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let marks = options
            .report_debug_info
            .then(|| MarkCollector::new(session_id.clone()));

        let mut driver = Driver {
            url,
            session_id,
            verbose: options.verbose,
            transport: Transport::new(socket, transport_config),
            local_state: LocalSyncState::new(),
            remote: RemoteQuerySet::new(),
            requests: RequestManager::new(),
            optimistic: OptimisticQueryResults::new(),
            auth: AuthManager::new(),
            on_transition,
            command_rx,
            max_observed_timestamp: None,
            fatal: None,
            marks,
            pending_reconnect: Some(Duration::ZERO),
            disconnected_at: None,
        };
        tokio::spawn(async move { driver.run().await });

        Ok(SyncClient { command_tx })
    }

    /// Subscribe to a query. Results flow through the transition callback;
    /// the latest value is readable via [`SyncClient::local_query_result`].
    pub async fn subscribe(
        &self,
        name: &str,
        args: Value,
        journal: Option<String>,
    ) -> Result<Subscription> {
        let udf_path = parse_path(name)?;
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe { udf_path, args, journal, reply })?;
        let token = rx.await.map_err(|_| ClientError::Closed)??;
        Ok(Subscription { token, command_tx: self.command_tx.clone() })
    }

    /// Run a mutation. Resolves after the mutation's effects are visible in
    /// the query view. An optimistic update, if given, applies immediately
    /// and is rolled back when the authoritative result lands.
    pub async fn mutation(
        &self,
        name: &str,
        args: Value,
        optimistic: Option<OptimisticUpdateFn>,
    ) -> Result<Value> {
        let udf_path = parse_path(name)?;
        let (sender, rx) = oneshot::channel();
        self.send(Command::Mutation { udf_path, args, optimistic, sender })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Run an action. Actions are never replayed after a reconnect; if the
    /// connection drops while one is outstanding, it fails with
    /// [`ClientError::ConnectionLost`].
    pub async fn action(&self, name: &str, args: Value) -> Result<Value> {
        let udf_path = parse_path(name)?;
        let (sender, rx) = oneshot::channel();
        self.send(Command::Action { udf_path, args, sender })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Latest visible result for a query, optimistic overlay included.
    /// `Ok(None)` when the query has no result yet (or is not subscribed);
    /// an error when the query itself failed.
    pub async fn local_query_result(&self, name: &str, args: Value) -> Result<Option<Value>> {
        let udf_path = parse_path(name)?;
        let (reply, rx) = oneshot::channel();
        self.send(Command::LocalQueryResult { udf_path, args, reply })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Last server-issued journal for a subscribed query.
    pub async fn query_journal(&self, name: &str, args: Value) -> Result<Option<String>> {
        let udf_path = parse_path(name)?;
        let (reply, rx) = oneshot::channel();
        self.send(Command::QueryJournal { udf_path, args, reply })?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Install an auth token fetcher. `on_change` observes transitions
    /// between authenticated and unauthenticated.
    pub fn set_auth(
        &self,
        fetcher: impl AuthTokenFetcher + 'static,
        on_change: impl FnMut(bool) + Send + 'static,
    ) -> Result<()> {
        self.send(Command::SetAuth {
            fetcher: Box::new(fetcher),
            on_change: Box::new(on_change),
        })
    }

    /// Drop credentials and return the connection to anonymous.
    pub fn clear_auth(&self) -> Result<()> {
        self.send(Command::ClearAuth)
    }

    /// Snapshot of connection health.
    pub async fn connection_state(&self) -> Result<ConnectionState> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ConnectionState { reply })?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Fail every in-flight request with a terminal error and shut the
    /// socket down. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Close { reply })?;
        let _ = rx.await;
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.command_tx.send(command).map_err(|_| ClientError::Closed)
    }
}

fn parse_path(name: &str) -> Result<UdfPath> {
    UdfPath::parse(name).map_err(|e| ClientError::Misuse(e.to_string()))
}

/// What woke the driver up.
enum LoopEvent {
    Command(Option<Command>),
    Socket(TransportEvent),
    ReconnectTick,
    AuthRefreshTick,
}

struct Driver<S: Socket> {
    url: String,
    session_id: String,
    verbose: bool,
    transport: Transport<S>,
    local_state: LocalSyncState,
    remote: RemoteQuerySet,
    requests: RequestManager,
    optimistic: OptimisticQueryResults,
    auth: AuthManager,
    on_transition: TransitionCallback,
    command_rx: mpsc::UnboundedReceiver<Command>,
    max_observed_timestamp: Option<Timestamp>,
    fatal: Option<ClientError>,
    marks: Option<MarkCollector>,
    /// Delay before the next connect attempt, when one is scheduled.
    pending_reconnect: Option<Duration>,
    disconnected_at: Option<Instant>,
}

impl<S: Socket> Driver<S> {
    async fn run(&mut self) {
        loop {
            let receiving = self.transport.is_receiving();
            let reconnect_delay = self.pending_reconnect.unwrap_or(Duration::ZERO);
            let reconnect_due = self.pending_reconnect.is_some() && self.fatal.is_none();
            let refresh_delay = self.auth_refresh_delay();

            let event = {
                let transport = &mut self.transport;
                let command_rx = &mut self.command_rx;
                tokio::select! {
                    cmd = command_rx.recv() => LoopEvent::Command(cmd),
                    event = transport.recv(), if receiving => LoopEvent::Socket(event),
                    _ = tokio::time::sleep(reconnect_delay), if reconnect_due => {
                        LoopEvent::ReconnectTick
                    }
                    _ = tokio::time::sleep(refresh_delay.unwrap_or(Duration::from_secs(3600))),
                        if refresh_delay.is_some() =>
                    {
                        LoopEvent::AuthRefreshTick
                    }
                }
            };

            match event {
                LoopEvent::Command(None) => {
                    // Every handle is gone; shut down quietly.
                    self.shutdown().await;
                    return;
                }
                LoopEvent::Command(Some(Command::Close { reply })) => {
                    self.shutdown().await;
                    let _ = reply.send(());
                    return;
                }
                LoopEvent::Command(Some(command)) => self.handle_command(command).await,
                LoopEvent::Socket(event) => self.handle_socket_event(event).await,
                LoopEvent::ReconnectTick => self.attempt_connect().await,
                LoopEvent::AuthRefreshTick => {
                    let directive = self.auth.refresh().await;
                    self.handle_auth_directive(directive).await;
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        for completed in self.requests.fail_all(ClientError::Closed) {
            let _ = completed.sender.send(completed.result);
        }
        self.pending_reconnect = None;
        self.transport.stop().await;
    }

    async fn attempt_connect(&mut self) {
        self.pending_reconnect = None;
        if self.transport.connect(&self.url).await {
            self.on_open().await;
        } else {
            self.pending_reconnect = Some(self.transport.next_attempt_delay());
        }
    }

    /// Runs on every successful (re)open, before any buffered traffic.
    async fn on_open(&mut self) {
        if let Some(marks) = self.marks.as_mut() {
            marks.record("ws_open");
        }
        let info = self.transport.reconnect_info();
        info!(
            connection_count = info.connection_count,
            last_close_reason = %info.last_close_reason,
            "connected"
        );

        // Telemetry for long disconnects, best-effort.
        if let Some(went_down) = self.disconnected_at.take() {
            let down_secs = went_down.elapsed().as_secs();
            if down_secs >= LONG_DISCONNECT_SECS {
                if let Some(marks) = self.marks.as_mut() {
                    let event = marks.reconnect_event(down_secs);
                    let _ = self.transport.send_message(event).await;
                }
            }
        }

        let connect = ClientMessage::connect(
            self.session_id.clone(),
            info.connection_count,
            info.last_close_reason,
            self.max_observed_timestamp,
        );
        self.send_frame(connect).await;

        // Fresh connection, fresh server-side state.
        self.remote = RemoteQuerySet::new();
        self.auth.on_reconnect();

        for frame in self.local_state.restart() {
            self.send_frame(frame).await;
        }

        let (replay, dropped) = self.requests.restart();
        for frame in replay {
            self.send_frame(frame).await;
        }
        for completed in dropped {
            let _ = completed.sender.send(completed.result);
        }
    }

    async fn handle_socket_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(msg) => self.handle_server_message(msg).await,
            TransportEvent::Disconnected { reason } => {
                warn!(reason = %reason, "connection lost");
                self.disconnected_at = Some(Instant::now());
                self.pending_reconnect = Some(self.transport.next_attempt_delay());
            }
        }
    }

    async fn handle_server_message(&mut self, msg: ServerMessage) {
        if self.verbose {
            debug!(frame = ?msg, "received");
        }
        match msg {
            ServerMessage::Transition { .. } => self.handle_transition(msg).await,
            ServerMessage::MutationResponse { .. } | ServerMessage::ActionResponse { .. } => {
                self.handle_response(msg);
            }
            ServerMessage::AuthError { error, .. } => {
                let directive = self.auth.on_auth_error(&error).await;
                self.handle_auth_directive(directive).await;
            }
            ServerMessage::FatalError { error } => {
                self.fail_fatal(ClientError::FatalServer(error)).await;
            }
            ServerMessage::Ping => {}
        }
    }

    async fn handle_transition(&mut self, msg: ServerMessage) {
        self.surface_log_lines(&msg);
        self.local_state.save_query_journals(&msg);

        if let Err(e) = self.remote.apply(&msg) {
            self.fail_fatal(e).await;
            return;
        }

        let ts = self.remote.timestamp();
        self.max_observed_timestamp = Some(
            self.max_observed_timestamp.map_or(ts, |prev| prev.max(ts)),
        );

        let completed = self.requests.remove_completed(ts);
        let completed_ids: BTreeSet<RequestId> =
            completed.iter().map(|c| c.request_id).collect();

        let mut authoritative = BTreeMap::new();
        for (query_id, result) in self.remote.results() {
            // Results for queries we no longer subscribe to are filtered.
            if let Some(token) = self.local_state.query_token(*query_id) {
                authoritative.insert(token.clone(), result.clone());
            }
        }

        let changed = self.optimistic.apply_server_update(authoritative, &completed_ids);
        self.emit(&changed);

        // Resolve held mutations only after the change callback saw the
        // view that contains their effects.
        for completed in completed {
            let _ = completed.sender.send(completed.result);
        }

        self.auth.on_transition();
    }

    fn handle_response(&mut self, msg: ServerMessage) {
        self.surface_log_lines(&msg);
        let current_ts = self.remote.timestamp();
        let Some(completed) = self.requests.on_response(&msg, current_ts) else {
            return;
        };

        let changed = match completed.kind {
            RequestKind::Mutation => self.optimistic.drop_update(completed.request_id),
            RequestKind::Action => BTreeSet::new(),
        };
        self.emit(&changed);
        let _ = completed.sender.send(completed.result);
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe { udf_path, args, journal, reply } => {
                if let Some(fatal) = &self.fatal {
                    let _ = reply.send(Err(fatal.clone()));
                    return;
                }
                let (token, frame) = self.local_state.subscribe(udf_path, args, journal);
                if let Some(frame) = frame {
                    self.send_frame(frame).await;
                }
                let _ = reply.send(Ok(token));
            }
            Command::Unsubscribe { token } => {
                if let Some(frame) = self.local_state.unsubscribe(&token) {
                    self.send_frame(frame).await;
                    // The released query disappears from the view now; the
                    // server's confirming transition is filtered anyway.
                    let completed = BTreeSet::new();
                    let mut authoritative = BTreeMap::new();
                    for (query_id, result) in self.remote.results() {
                        if let Some(token) = self.local_state.query_token(*query_id) {
                            authoritative.insert(token.clone(), result.clone());
                        }
                    }
                    let changed = self.optimistic.apply_server_update(authoritative, &completed);
                    self.emit(&changed);
                }
            }
            Command::Mutation { udf_path, args, optimistic, sender } => {
                if let Some(fatal) = &self.fatal {
                    let _ = sender.send(Err(fatal.clone()));
                    return;
                }
                let request_id = self.requests.allocate_id();
                let frame =
                    ClientMessage::mutation(request_id, udf_path.clone(), args.clone());
                let might_be_sent = self.send_frame(frame).await;
                self.requests.register(
                    request_id,
                    RequestKind::Mutation,
                    udf_path,
                    args,
                    might_be_sent,
                    sender,
                );
                if let Some(update) = optimistic {
                    let changed = self.optimistic.add_update(request_id, update);
                    self.emit(&changed);
                }
            }
            Command::Action { udf_path, args, sender } => {
                if let Some(fatal) = &self.fatal {
                    let _ = sender.send(Err(fatal.clone()));
                    return;
                }
                let request_id = self.requests.allocate_id();
                let frame = ClientMessage::action(request_id, udf_path.clone(), args.clone());
                let might_be_sent = self.send_frame(frame).await;
                self.requests.register(
                    request_id,
                    RequestKind::Action,
                    udf_path,
                    args,
                    might_be_sent,
                    sender,
                );
            }
            Command::LocalQueryResult { udf_path, args, reply } => {
                let token = QueryToken::new(&udf_path, &args);
                let result = match self.optimistic.query_result(&token) {
                    Some(FunctionResult::Success(value)) => Ok(Some(value.clone())),
                    Some(FunctionResult::Failure(message)) => {
                        Err(ClientError::Application { message: message.clone() })
                    }
                    None => Ok(None),
                };
                let _ = reply.send(result);
            }
            Command::QueryJournal { udf_path, args, reply } => {
                let token = QueryToken::new(&udf_path, &args);
                let _ = reply.send(self.local_state.query_journal(&token).flatten());
            }
            Command::SetAuth { fetcher, on_change } => {
                let directive = self.auth.set_fetcher(fetcher, on_change).await;
                self.handle_auth_directive(directive).await;
            }
            Command::ClearAuth => {
                self.auth.clear();
                if self.local_state.has_auth() {
                    let frame = self.local_state.clear_auth();
                    self.send_frame(frame).await;
                }
            }
            Command::ConnectionState { reply } => {
                let _ = reply.send(self.connection_state());
            }
            Command::Close { reply } => {
                // Normally intercepted by the main loop; kept for
                // exhaustiveness.
                self.shutdown().await;
                let _ = reply.send(());
            }
        }
    }

    /// Splice an auth rotation into the stream: pause, authenticate,
    /// resume. While disconnected this only records state; the reconnect
    /// sequence re-presents it.
    async fn handle_auth_directive(&mut self, directive: AuthDirective) {
        match directive {
            AuthDirective::None => {}
            AuthDirective::Rotate(fetched) => {
                self.transport.pause();
                let frame = self.local_state.set_auth(fetched.token);
                self.send_frame(frame).await;
                self.transport.resume().await;
            }
            AuthDirective::Clear => {
                if self.local_state.has_auth() {
                    let frame = self.local_state.clear_auth();
                    self.send_frame(frame).await;
                }
            }
        }
    }

    async fn fail_fatal(&mut self, error: ClientError) {
        warn!(error = %error, "fatal error, stopping");
        self.fatal = Some(error.clone());
        for completed in self.requests.fail_all(error) {
            let _ = completed.sender.send(completed.result);
        }
        self.pending_reconnect = None;
        self.transport.stop().await;
    }

    async fn send_frame(&mut self, frame: ClientMessage) -> bool {
        if self.verbose {
            debug!(frame = ?frame, "sending");
        }
        self.transport.send_message(frame).await
    }

    fn emit(&mut self, changed: &BTreeSet<QueryToken>) {
        if !changed.is_empty() {
            (self.on_transition)(changed);
        }
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState {
            is_websocket_connected: self.transport.socket_state() == SocketState::Ready
                || self.transport.socket_state() == SocketState::Paused,
            socket_state: self.transport.socket_state(),
            connection_count: self.transport.reconnect_info().connection_count,
            has_inflight_requests: self.requests.has_inflight_requests(),
            has_incomplete_requests: self.requests.has_incomplete_requests(),
            time_of_oldest_inflight_request: self.requests.time_of_oldest_inflight_request(),
            fatal_error: self.fatal.as_ref().map(|e| e.to_string()),
        }
    }

    fn auth_refresh_delay(&self) -> Option<Duration> {
        let refresh_at = self.auth.next_refresh_at()?;
        let now = Utc::now();
        let delay = (refresh_at - now).to_std().unwrap_or(Duration::ZERO);
        // Floor keeps a stale expiry from busy-looping the driver.
        Some(delay.max(Duration::from_secs(1)))
    }

    /// Server log lines ride along on results; stream them through tracing
    /// the way a dev console would.
    fn surface_log_lines(&self, msg: &ServerMessage) {
        match msg {
            ServerMessage::Transition { modifications, .. } => {
                for modification in modifications {
                    let (query_id, lines) = match modification {
                        StateModification::QueryUpdated { query_id, log_lines, .. } => {
                            (query_id, log_lines)
                        }
                        StateModification::QueryFailed { query_id, log_lines, .. } => {
                            (query_id, log_lines)
                        }
                        StateModification::QueryRemoved { .. } => continue,
                    };
                    if lines.is_empty() {
                        continue;
                    }
                    let path = self
                        .local_state
                        .query_path(*query_id)
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| query_id.to_string());
                    for line in lines {
                        info!(udf = %path, "{}", line);
                    }
                }
            }
            ServerMessage::MutationResponse { request_id, log_lines, .. }
            | ServerMessage::ActionResponse { request_id, log_lines, .. } => {
                for line in log_lines {
                    info!(request = %request_id, "{}", line);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
