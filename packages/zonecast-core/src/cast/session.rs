//! The receiver session state machine.
//!
//! One engine task owns the transport link, the application-launch handshake,
//! the heartbeat and all reconnect policy. Every operation is a command on
//! its mailbox, so state only ever changes on one timeline; callers hold a
//! cloneable [`SessionHandle`] and observe status through a watch channel and
//! the event emitter.
//!
//! Status reports from the receiver are the sole driver of application
//! binding: a report naming our application with a new transport id (re)binds
//! the application channels, a report without it tears the binding down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use super::sanitize::sanitize;
use super::transport::{ChannelHandle, Envelope, Transport};
use super::types::{CastStatus, DeviceEndpoint, MessageKind, OutboundMessage, PlaybackPayload};
use super::{CastError, Recovery};
use crate::events::{CastEvent, EventEmitter};
use crate::protocol_constants::{
    CONNECTION_NAMESPACE, HEARTBEAT_INTERVAL, HEARTBEAT_NAMESPACE, LAUNCH_TIMEOUT,
    MAX_MESSAGE_BYTES, RECEIVER_ID, RECEIVER_NAMESPACE, RECONNECT_DELAY, RELAUNCH_DELAY,
    SENDER_ID,
};
use crate::utils::now_millis;

/// Pause between the PAUSE signal and the stop-application request.
const STOP_PAUSE_GRACE: Duration = Duration::from_millis(100);

/// Pause between the stop-application request and closing the app connection.
const STOP_CLOSE_GRACE: Duration = Duration::from_millis(200);

/// Session engine parameters. Defaults follow the protocol policy constants.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Application id to launch on the receiver.
    pub app_id: String,
    /// Namespace of the custom data channel.
    pub namespace: String,
    pub heartbeat_interval: Duration,
    pub launch_timeout: Duration,
    pub relaunch_delay: Duration,
    pub reconnect_delay: Duration,
    pub max_message_bytes: usize,
}

impl SessionConfig {
    #[must_use]
    pub fn new(app_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            namespace: namespace.into(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            launch_timeout: LAUNCH_TIMEOUT,
            relaunch_delay: RELAUNCH_DELAY,
            reconnect_delay: RECONNECT_DELAY,
            max_message_bytes: MAX_MESSAGE_BYTES,
        }
    }
}

/// Minimal session surface the playback dispatcher depends on.
///
/// A trait so the dispatcher is testable against a recording stub.
#[async_trait]
pub trait SessionControl: Send + Sync {
    /// Connects if needed and resolves once the application is bound.
    /// Concurrent callers share one in-flight launch request.
    async fn ensure_launched(&self) -> Result<(), CastError>;

    /// Sanitizes and transmits a payload on the custom channel.
    async fn send(&self, kind: MessageKind, payload: PlaybackPayload) -> Result<(), CastError>;

    /// Best-effort sequenced stop of the receiver application.
    async fn stop_app(&self);
}

/// Cloneable handle to the session engine task.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    status: watch::Receiver<CastStatus>,
}

impl SessionHandle {
    /// Connects to a device, making it the selected endpoint. No-op when the
    /// same device is already connected; an existing session to a different
    /// device is torn down first.
    pub async fn connect(&self, device: DeviceEndpoint) -> Result<(), CastError> {
        self.request(|reply| SessionCommand::Connect { device, reply })
            .await
    }

    /// Disconnects the transport, keeping the selection.
    pub async fn disconnect(&self) {
        let _ = self.commands.send(SessionCommand::Disconnect).await;
    }

    /// Clears the selection and returns the session to idle.
    pub async fn clear_selection(&self) {
        let _ = self.commands.send(SessionCommand::ClearSelection).await;
    }

    /// Current session status.
    #[must_use]
    pub fn status(&self) -> CastStatus {
        *self.status.borrow()
    }

    /// Watch channel for status transitions.
    #[must_use]
    pub fn status_watch(&self) -> watch::Receiver<CastStatus> {
        self.status.clone()
    }

    async fn request<T, F>(&self, build: F) -> Result<T, CastError>
    where
        F: FnOnce(oneshot::Sender<Result<T, CastError>>) -> SessionCommand,
    {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| CastError::SessionClosed)?;
        rx.await.map_err(|_| CastError::SessionClosed)?
    }
}

#[async_trait]
impl SessionControl for SessionHandle {
    async fn ensure_launched(&self) -> Result<(), CastError> {
        self.request(|reply| SessionCommand::EnsureLaunched { reply })
            .await
    }

    async fn send(&self, kind: MessageKind, payload: PlaybackPayload) -> Result<(), CastError> {
        self.request(|reply| SessionCommand::Send {
            kind,
            payload,
            reply,
        })
        .await
    }

    async fn stop_app(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::StopApp { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

/// Spawns the session engine task and returns its handle.
pub fn spawn_session(
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    emitter: Arc<dyn EventEmitter>,
) -> SessionHandle {
    let (command_tx, command_rx) = mpsc::channel(32);
    let (status_tx, status_rx) = watch::channel(CastStatus::Idle);
    let engine = SessionEngine {
        config,
        transport,
        emitter,
        commands: command_rx,
        status: status_tx,
        selected: None,
        link: None,
        pending_launch: None,
        reconnect: None,
        last_message: None,
        request_id: 0,
    };
    tokio::spawn(engine.run());
    SessionHandle {
        commands: command_tx,
        status: status_rx,
    }
}

enum SessionCommand {
    Connect {
        device: DeviceEndpoint,
        reply: oneshot::Sender<Result<(), CastError>>,
    },
    EnsureLaunched {
        reply: oneshot::Sender<Result<(), CastError>>,
    },
    Send {
        kind: MessageKind,
        payload: PlaybackPayload,
        reply: oneshot::Sender<Result<(), CastError>>,
    },
    StopApp {
        reply: oneshot::Sender<()>,
    },
    Disconnect,
    ClearSelection,
}

/// Live transport state. Dropping the link drops the outbound sender, which
/// terminates the writer task and with it the socket.
struct Link {
    outbound: mpsc::Sender<Envelope>,
    inbound: mpsc::Receiver<Envelope>,
    receiver: ChannelHandle,
    heartbeat: ChannelHandle,
    app_connection: Option<ChannelHandle>,
    custom: Option<ChannelHandle>,
    transport_id: Option<String>,
    next_ping: Instant,
}

impl Link {
    fn app_ready(&self) -> bool {
        self.transport_id.is_some() && self.custom.is_some()
    }
}

struct PendingLaunch {
    waiters: Vec<oneshot::Sender<Result<(), CastError>>>,
    deadline: Instant,
}

struct ReconnectPlan {
    at: Instant,
    relaunch: bool,
}

/// Receiver-control message shapes we care about.
#[derive(Debug, Deserialize)]
struct ReceiverMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    status: Option<ReceiverStatus>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReceiverStatus {
    #[serde(default)]
    applications: Vec<ApplicationEntry>,
}

#[derive(Debug, Deserialize)]
struct ApplicationEntry {
    #[serde(rename = "appId")]
    app_id: String,
    #[serde(rename = "transportId")]
    transport_id: String,
}

struct SessionEngine {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    emitter: Arc<dyn EventEmitter>,
    commands: mpsc::Receiver<SessionCommand>,
    status: watch::Sender<CastStatus>,
    selected: Option<DeviceEndpoint>,
    link: Option<Link>,
    pending_launch: Option<PendingLaunch>,
    reconnect: Option<ReconnectPlan>,
    last_message: Option<OutboundMessage>,
    request_id: u64,
}

impl SessionEngine {
    async fn run(mut self) {
        loop {
            let ping_at = self.link.as_ref().map(|link| link.next_ping);
            let launch_at = self.pending_launch.as_ref().map(|pending| pending.deadline);
            let reconnect_at = self.reconnect.as_ref().map(|plan| plan.at);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // Every handle dropped; the session dies with its owners.
                    None => break,
                },
                message = recv_inbound(&mut self.link) => match message {
                    Some(envelope) => self.handle_envelope(envelope).await,
                    None => self.handle_transport_closed(),
                },
                _ = sleep_until_opt(ping_at) => self.send_heartbeat().await,
                _ = sleep_until_opt(launch_at) => self.expire_launch(),
                _ = sleep_until_opt(reconnect_at) => self.run_reconnect().await,
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { device, reply } => {
                let switching = self.link.is_some()
                    && self.selected.as_ref().map(|d| d.id.as_str()) != Some(device.id.as_str());
                if switching {
                    log::info!("[Cast] selection changed, tearing down current session");
                    self.disconnect();
                }
                self.selected = Some(device);
                let result = self.ensure_connected().await;
                let _ = reply.send(result);
            }
            SessionCommand::EnsureLaunched { reply } => self.ensure_launched(reply).await,
            SessionCommand::Send {
                kind,
                payload,
                reply,
            } => {
                let result = self.send_message(kind, payload).await;
                if let Err(err) = &result {
                    self.handle_transport_error(err.clone());
                }
                let _ = reply.send(result);
            }
            SessionCommand::StopApp { reply } => {
                self.stop_application().await;
                let _ = reply.send(());
            }
            SessionCommand::Disconnect => self.disconnect(),
            SessionCommand::ClearSelection => {
                self.selected = None;
                self.disconnect();
            }
        }
    }

    /// Opens the transport and performs the platform handshake. No-op when a
    /// link already exists.
    async fn ensure_connected(&mut self) -> Result<(), CastError> {
        if self.link.is_some() {
            log::debug!("[Cast] reusing existing receiver connection");
            return Ok(());
        }
        let device = self.selected.clone().ok_or(CastError::NoDeviceSelected)?;

        self.set_status(CastStatus::Connecting);
        log::info!(
            "[Cast] connecting to '{}' at {}:{}",
            device.id,
            device.address,
            device.port
        );
        let connection = match self.transport.connect(&device.address, device.port).await {
            Ok(connection) => connection,
            Err(err) => {
                self.emit_error(&err);
                self.disconnect();
                return Err(err);
            }
        };

        let (outbound, inbound) = connection.split();
        let connection_channel =
            ChannelHandle::new(SENDER_ID, RECEIVER_ID, CONNECTION_NAMESPACE, outbound.clone());
        let receiver =
            ChannelHandle::new(SENDER_ID, RECEIVER_ID, RECEIVER_NAMESPACE, outbound.clone());
        let heartbeat =
            ChannelHandle::new(SENDER_ID, RECEIVER_ID, HEARTBEAT_NAMESPACE, outbound.clone());

        let request_id = self.next_request_id();
        let handshake = async {
            connection_channel.send(json!({ "type": "CONNECT" })).await?;
            receiver
                .send(json!({ "type": "GET_STATUS", "requestId": request_id }))
                .await
        }
        .await;
        if let Err(err) = handshake {
            self.emit_error(&err);
            self.disconnect();
            return Err(err);
        }

        self.link = Some(Link {
            outbound,
            inbound,
            receiver,
            heartbeat,
            app_connection: None,
            custom: None,
            transport_id: None,
            next_ping: Instant::now() + self.config.heartbeat_interval,
        });
        self.set_status(CastStatus::Connected);
        Ok(())
    }

    /// Connects if needed, then resolves immediately if the application is
    /// bound, joins an in-flight launch, or issues a new launch request.
    async fn ensure_launched(&mut self, reply: oneshot::Sender<Result<(), CastError>>) {
        if let Err(err) = self.ensure_connected().await {
            let _ = reply.send(Err(err));
            return;
        }
        if self.link.as_ref().is_some_and(Link::app_ready) {
            let _ = reply.send(Ok(()));
            return;
        }
        if let Some(pending) = self.pending_launch.as_mut() {
            log::debug!("[Cast] joining in-flight launch request");
            pending.waiters.push(reply);
            return;
        }

        let request_id = self.next_request_id();
        let send_result = match self.link.as_ref() {
            Some(link) => {
                log::info!("[Cast] launching application {}", self.config.app_id);
                link.receiver
                    .send(json!({
                        "type": "LAUNCH",
                        "appId": self.config.app_id,
                        "requestId": request_id,
                    }))
                    .await
            }
            None => Err(CastError::ReceiverChannelUnavailable),
        };

        match send_result {
            Ok(()) => {
                self.pending_launch = Some(PendingLaunch {
                    waiters: vec![reply],
                    deadline: Instant::now() + self.config.launch_timeout,
                });
            }
            Err(err) => {
                let _ = reply.send(Err(err.clone()));
                self.handle_transport_error(err);
            }
        }
    }

    /// Sanitizes, retains and transmits a payload on the custom channel.
    async fn send_message(
        &mut self,
        kind: MessageKind,
        payload: PlaybackPayload,
    ) -> Result<(), CastError> {
        let message = sanitize(kind, payload, self.config.max_message_bytes);
        let value = message
            .to_value()
            .map_err(|e| CastError::Codec(e.to_string()))?;
        self.last_message = Some(message);

        let custom = self.link.as_ref().and_then(|link| link.custom.clone());
        match custom {
            Some(channel) => channel.send(value).await,
            None => Err(CastError::AppChannelUnavailable),
        }
    }

    async fn handle_envelope(&mut self, envelope: Envelope) {
        if envelope.namespace == HEARTBEAT_NAMESPACE {
            // The receiver PONGs our PINGs; nothing to track.
            return;
        }
        if envelope.namespace == RECEIVER_NAMESPACE {
            self.handle_receiver_message(envelope.payload).await;
            return;
        }
        if envelope.namespace == self.config.namespace {
            self.emitter.emit_cast(CastEvent::MessageReceived {
                message: envelope.payload,
                timestamp: now_millis(),
            });
            return;
        }
        if envelope.namespace == CONNECTION_NAMESPACE {
            let is_close = envelope.payload.get("type").and_then(|t| t.as_str()) == Some("CLOSE");
            let from_app = self
                .link
                .as_ref()
                .and_then(|link| link.transport_id.as_deref())
                == Some(envelope.source.as_str());
            if is_close && from_app {
                log::info!("[Cast] receiver application closed its connection");
                self.reset_application_state();
            }
            return;
        }
        log::trace!("[Cast] ignoring message on {}", envelope.namespace);
    }

    async fn handle_receiver_message(&mut self, payload: serde_json::Value) {
        let message: ReceiverMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("[Cast] unparseable receiver message: {}", err);
                return;
            }
        };
        match message.kind.as_str() {
            "RECEIVER_STATUS" => {
                self.process_receiver_status(message.status.unwrap_or_default())
                    .await;
            }
            "LAUNCH_ERROR" => {
                let reason = message.reason.unwrap_or_else(|| "launch error".to_string());
                log::error!("[Cast] receiver rejected launch: {}", reason);
                self.reject_pending_launch(CastError::LaunchRejected(reason));
            }
            other => log::trace!("[Cast] unhandled receiver message type {}", other),
        }
    }

    /// Applies a receiver status report. The last report processed wins.
    async fn process_receiver_status(&mut self, status: ReceiverStatus) {
        let app = status
            .applications
            .into_iter()
            .find(|app| app.app_id == self.config.app_id);

        match app {
            None => {
                self.reset_application_state();
                self.reject_pending_launch(CastError::LaunchRejected(
                    "receiver application not running".into(),
                ));
            }
            Some(app) => {
                let rebind = self
                    .link
                    .as_ref()
                    .is_some_and(|link| link.transport_id.as_deref() != Some(&app.transport_id));
                if rebind {
                    self.bind_application_channels(app.transport_id).await;
                }
                self.resolve_pending_launch();
            }
        }
    }

    /// Binds the application-scoped connection and custom channels, then
    /// flushes the retained last message onto the fresh channel.
    async fn bind_application_channels(&mut self, transport_id: String) {
        let namespace = self.config.namespace.clone();
        let Some(link) = self.link.as_mut() else {
            return;
        };
        log::info!("[Cast] binding application channels to {}", transport_id);

        let app_connection = ChannelHandle::new(
            SENDER_ID,
            &transport_id,
            CONNECTION_NAMESPACE,
            link.outbound.clone(),
        );
        let custom = ChannelHandle::new(SENDER_ID, &transport_id, &namespace, link.outbound.clone());
        link.app_connection = Some(app_connection.clone());
        link.custom = Some(custom);
        link.transport_id = Some(transport_id);

        if let Err(err) = app_connection.send(json!({ "type": "CONNECT" })).await {
            log::warn!("[Cast] application CONNECT failed: {}", err);
        }
        self.set_status(CastStatus::AppReady);
        self.flush_last_message().await;
    }

    /// Retransmits the retained message after a (re)bind, so the receiver
    /// shows current state again after a reconnect.
    async fn flush_last_message(&mut self) {
        let custom = self.link.as_ref().and_then(|link| link.custom.clone());
        let value = self
            .last_message
            .as_ref()
            .and_then(|message| message.to_value().ok());
        let (Some(channel), Some(value)) = (custom, value) else {
            return;
        };
        log::info!("[Cast] resending retained message on fresh channel");
        if let Err(err) = channel.send(value).await {
            self.handle_transport_error(err);
        }
    }

    /// Best-effort sequenced shutdown of the receiver application. Every step
    /// tolerates failure on its own.
    async fn stop_application(&mut self) {
        if let Some(custom) = self.link.as_ref().and_then(|link| link.custom.clone()) {
            log::info!("[Cast] sending PAUSE to receiver application");
            if let Err(err) = custom.send(json!({ "type": "PAUSE" })).await {
                log::warn!("[Cast] pause before stop failed: {}", err);
            }
            tokio::time::sleep(STOP_PAUSE_GRACE).await;
        }

        if let Some(link) = self.link.as_ref() {
            log::info!("[Cast] requesting application stop");
            let stop = json!({ "type": "STOP", "appId": self.config.app_id });
            if let Err(err) = link.receiver.send(stop).await {
                log::warn!("[Cast] stop request failed: {}", err);
            }
            tokio::time::sleep(STOP_CLOSE_GRACE).await;
        }

        if let Some(app_connection) = self
            .link
            .as_ref()
            .and_then(|link| link.app_connection.clone())
        {
            if let Err(err) = app_connection.send(json!({ "type": "CLOSE" })).await {
                log::debug!("[Cast] application CLOSE failed: {}", err);
            }
        }

        self.reset_application_state();
        self.last_message = None;
        self.set_status(if self.selected.is_some() {
            CastStatus::Connected
        } else {
            CastStatus::Idle
        });
    }

    /// Tears down the application binding, leaving the platform connection up.
    fn reset_application_state(&mut self) {
        let was_ready = self.link.as_ref().is_some_and(Link::app_ready);
        if let Some(link) = self.link.as_mut() {
            link.transport_id = None;
            link.custom = None;
            link.app_connection = None;
        }
        if was_ready {
            self.set_status(CastStatus::Connected);
        }
    }

    /// Drops the transport and all channel handles; pending launches are
    /// rejected rather than left dangling.
    fn disconnect(&mut self) {
        self.link = None;
        self.reject_pending_launch(CastError::TransportClosed("disconnected".into()));
        self.set_status(if self.selected.is_some() {
            CastStatus::Disconnected
        } else {
            CastStatus::Idle
        });
    }

    fn handle_transport_closed(&mut self) {
        log::warn!("[Cast] receiver connection closed");
        self.disconnect();
    }

    /// Classifies a failure and schedules the matching recovery.
    fn handle_transport_error(&mut self, err: CastError) {
        self.emit_error(&err);
        match err.recovery() {
            Recovery::Relaunch => {
                self.reset_application_state();
                self.disconnect();
                if self.selected.is_some() {
                    log::info!(
                        "[Cast] scheduling reconnect and relaunch in {:?}",
                        self.config.relaunch_delay
                    );
                    self.reconnect = Some(ReconnectPlan {
                        at: Instant::now() + self.config.relaunch_delay,
                        relaunch: true,
                    });
                }
            }
            Recovery::Reconnect => {
                self.disconnect();
                if self.selected.is_some() {
                    log::info!(
                        "[Cast] scheduling reconnect in {:?}",
                        self.config.reconnect_delay
                    );
                    self.reconnect = Some(ReconnectPlan {
                        at: Instant::now() + self.config.reconnect_delay,
                        relaunch: false,
                    });
                }
            }
            Recovery::Surface => {}
        }
    }

    async fn run_reconnect(&mut self) {
        let Some(plan) = self.reconnect.take() else {
            return;
        };
        log::info!("[Cast] attempting reconnect (relaunch: {})", plan.relaunch);
        match self.ensure_connected().await {
            Ok(()) if plan.relaunch => {
                // Nobody is awaiting this launch; the outcome surfaces through
                // status transitions and error events.
                let (reply, _observer) = oneshot::channel();
                self.ensure_launched(reply).await;
            }
            Ok(()) => {}
            Err(err) => log::warn!("[Cast] reconnect failed: {}", err),
        }
    }

    async fn send_heartbeat(&mut self) {
        let heartbeat = match self.link.as_mut() {
            Some(link) => {
                link.next_ping = Instant::now() + self.config.heartbeat_interval;
                link.heartbeat.clone()
            }
            None => return,
        };
        if let Err(err) = heartbeat.send(json!({ "type": "PING" })).await {
            self.handle_transport_error(err);
        }
    }

    fn expire_launch(&mut self) {
        let timeout = self.config.launch_timeout.as_secs();
        log::error!("[Cast] launch timed out after {}s", timeout);
        self.reject_pending_launch(CastError::LaunchTimeout(timeout));
    }

    fn resolve_pending_launch(&mut self) {
        if let Some(pending) = self.pending_launch.take() {
            for waiter in pending.waiters {
                let _ = waiter.send(Ok(()));
            }
        }
    }

    fn reject_pending_launch(&mut self, err: CastError) {
        if let Some(pending) = self.pending_launch.take() {
            self.emit_error(&err);
            for waiter in pending.waiters {
                let _ = waiter.send(Err(err.clone()));
            }
        }
    }

    fn set_status(&mut self, status: CastStatus) {
        if *self.status.borrow() == status {
            return;
        }
        log::debug!("[Cast] status -> {:?}", status);
        let _ = self.status.send(status);
        self.emitter.emit_cast(CastEvent::StatusChanged {
            status,
            timestamp: now_millis(),
        });
    }

    fn emit_error(&self, err: &CastError) {
        self.emitter.emit_cast(CastEvent::Error {
            message: err.to_string(),
            timestamp: now_millis(),
        });
    }

    fn next_request_id(&mut self) -> u64 {
        self.request_id += 1;
        self.request_id
    }
}

async fn recv_inbound(link: &mut Option<Link>) -> Option<Envelope> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
