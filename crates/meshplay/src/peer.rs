//! Peer actor: one Tokio task that owns a peer's session and game.
//!
//! The actor serializes everything that can touch peer state: host
//! commands, transport events, the one-shot start timer and the world
//! step scheduler. Nothing it owns is shared, so nothing is locked.

use std::future;
use std::pin::Pin;
use std::time::SystemTime;

use meshplay_clock::{StepInfo, StepScheduler, deadline_instant};
use meshplay_game::{
    ArrowKeys, GameConfig, GameController, GameError, GameStatus, GameView,
    KeyBindings, Stage,
};
use meshplay_protocol::Direction;
use meshplay_session::{
    IdentityStore, Mode, SessionConfig, SessionError, SessionManager,
    SessionNotification,
};
use meshplay_transport::{MeshTransport, PeerId, TransportEvent};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Sleep;

use crate::MeshplayError;

/// Default bound of the command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 32;

/// Returns the identity this device should join the mesh with.
///
/// Loads (or creates and saves) the identity at
/// [`SessionConfig::identity_path`] when one is configured, otherwise
/// generates a fresh one.
pub fn local_identity(config: &SessionConfig) -> Result<PeerId, MeshplayError> {
    match &config.identity_path {
        Some(path) => Ok(IdentityStore::new(path).load_or_create(&config.display_name)?),
        None => Ok(PeerId::generate(config.display_name.clone())),
    }
}

/// Commands sent to a peer actor. Variants with a `reply` expect an
/// answer on that channel.
enum PeerCommand {
    SetMode {
        mode: Mode,
        reply: oneshot::Sender<()>,
    },
    Browsing {
        start: bool,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Advertising {
        start: bool,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Invite {
        peer: PeerId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    AnswerInvitation {
        peer: PeerId,
        accept: bool,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    FoundPeers {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    StartGame {
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    KeyInput {
        key: String,
        reply: oneshot::Sender<Option<Direction>>,
    },
    Subscribe {
        reply: oneshot::Sender<broadcast::Receiver<SessionNotification>>,
    },
    Info {
        reply: oneshot::Sender<PeerInfo>,
    },
    Shutdown,
}

/// A snapshot of a peer's session and game state.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub peer: PeerId,
    pub mode: Mode,
    pub game_status: GameStatus,
    pub connected_peers: Vec<PeerId>,
    /// Local rank in the current session; `0` is the coordinator.
    pub precedence: usize,
    pub start_date: Option<SystemTime>,
    /// World steps taken since the game started.
    pub steps: u64,
}

/// Configures and starts a peer actor.
pub struct PeerBuilder {
    session_config: SessionConfig,
    game_config: GameConfig,
    key_bindings: Box<dyn KeyBindings + Send>,
    command_capacity: usize,
}

impl PeerBuilder {
    pub fn new() -> Self {
        Self {
            session_config: SessionConfig::default(),
            game_config: GameConfig::default(),
            key_bindings: Box::new(ArrowKeys),
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.game_config = config;
        self
    }

    /// Replaces the default [`ArrowKeys`] bindings.
    pub fn key_bindings(mut self, bindings: impl KeyBindings + Send + 'static) -> Self {
        self.key_bindings = Box::new(bindings);
        self
    }

    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }

    /// Spawns the actor on the current Tokio runtime.
    ///
    /// `events` must be the event stream that belongs to `transport`.
    pub fn spawn<T, S, V>(
        self,
        transport: T,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        stage: S,
        view: V,
    ) -> PeerHandle
    where
        T: MeshTransport,
        S: Stage + Send + 'static,
        V: GameView + Send + 'static,
    {
        let scheduler = StepScheduler::with_rate(self.game_config.step_rate_hz);
        let session = SessionManager::new(transport, self.session_config);
        let peer = session.local_peer().clone();
        let (sender, commands) = mpsc::channel(self.command_capacity);

        let actor = PeerActor {
            game: GameController::new(session, stage, view, self.game_config),
            events,
            commands,
            key_bindings: self.key_bindings,
            start_timer: None,
            scheduler,
        };
        tokio::spawn(actor.run());

        PeerHandle { peer, sender }
    }
}

impl Default for PeerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running peer actor.
///
/// Cheap to clone. Every method fails with
/// [`MeshplayError::PeerStopped`] once the actor has exited.
#[derive(Clone)]
pub struct PeerHandle {
    peer: PeerId,
    sender: mpsc::Sender<PeerCommand>,
}

impl PeerHandle {
    pub fn builder() -> PeerBuilder {
        PeerBuilder::new()
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> PeerCommand,
    ) -> Result<R, MeshplayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| self.stopped())?;
        reply_rx.await.map_err(|_| self.stopped())
    }

    fn stopped(&self) -> MeshplayError {
        MeshplayError::PeerStopped(self.peer.to_string())
    }

    pub async fn set_mode(&self, mode: Mode) -> Result<(), MeshplayError> {
        self.request(|reply| PeerCommand::SetMode { mode, reply }).await
    }

    pub async fn start_browsing(&self) -> Result<(), MeshplayError> {
        self.request(|reply| PeerCommand::Browsing { start: true, reply })
            .await??;
        Ok(())
    }

    pub async fn stop_browsing(&self) -> Result<(), MeshplayError> {
        self.request(|reply| PeerCommand::Browsing { start: false, reply })
            .await??;
        Ok(())
    }

    pub async fn start_advertising(&self) -> Result<(), MeshplayError> {
        self.request(|reply| PeerCommand::Advertising { start: true, reply })
            .await??;
        Ok(())
    }

    pub async fn stop_advertising(&self) -> Result<(), MeshplayError> {
        self.request(|reply| PeerCommand::Advertising { start: false, reply })
            .await??;
        Ok(())
    }

    /// Invites a found peer into the session.
    pub async fn invite(&self, peer: PeerId) -> Result<(), MeshplayError> {
        self.request(|reply| PeerCommand::Invite { peer, reply })
            .await??;
        Ok(())
    }

    /// Answers an invitation held because auto-accept is off.
    pub async fn answer_invitation(
        &self,
        peer: PeerId,
        accept: bool,
    ) -> Result<(), MeshplayError> {
        self.request(|reply| PeerCommand::AnswerInvitation { peer, accept, reply })
            .await??;
        Ok(())
    }

    pub async fn found_peers(&self) -> Result<Vec<PeerId>, MeshplayError> {
        self.request(|reply| PeerCommand::FoundPeers { reply }).await
    }

    pub async fn connected_peers(&self) -> Result<Vec<PeerId>, MeshplayError> {
        Ok(self.info().await?.connected_peers)
    }

    /// Shows the game on this peer and joins the start barrier.
    pub async fn start_game(&self) -> Result<(), MeshplayError> {
        self.request(|reply| PeerCommand::StartGame { reply })
            .await??;
        Ok(())
    }

    /// Forwards a key press. Returns the new direction if it was applied.
    pub async fn key_input(
        &self,
        key: impl Into<String>,
    ) -> Result<Option<Direction>, MeshplayError> {
        let key = key.into();
        self.request(|reply| PeerCommand::KeyInput { key, reply }).await
    }

    /// Subscribes to lobby change notifications.
    pub async fn subscribe(
        &self,
    ) -> Result<broadcast::Receiver<SessionNotification>, MeshplayError> {
        self.request(|reply| PeerCommand::Subscribe { reply }).await
    }

    pub async fn info(&self) -> Result<PeerInfo, MeshplayError> {
        self.request(|reply| PeerCommand::Info { reply }).await
    }

    /// Leaves the session and stops the actor.
    pub async fn shutdown(&self) -> Result<(), MeshplayError> {
        self.sender
            .send(PeerCommand::Shutdown)
            .await
            .map_err(|_| self.stopped())
    }

    /// Resolves once the actor has exited.
    pub async fn closed(&self) {
        self.sender.closed().await;
    }
}

struct PeerActor<T: MeshTransport, S, V> {
    game: GameController<SessionManager<T>, S, V>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::Receiver<PeerCommand>,
    key_bindings: Box<dyn KeyBindings + Send>,
    /// Armed once the game is scheduled; never cancelled.
    start_timer: Option<Pin<Box<Sleep>>>,
    scheduler: StepScheduler,
}

impl<T, S, V> PeerActor<T, S, V>
where
    T: MeshTransport,
    S: Stage,
    V: GameView,
{
    async fn run(mut self) {
        let peer = self.game.mesh().local_peer().clone();
        tracing::info!(%peer, "peer actor started");

        loop {
            let keep_running = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(PeerCommand::Shutdown) | None => false,
                    Some(command) => self.handle_command(command),
                },
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        tracing::info!(%peer, "transport event stream closed");
                        false
                    }
                },
                () = wait_for_start(&mut self.start_timer) => {
                    self.start_timer = None;
                    self.on_start_deadline();
                    true
                }
                info = self.scheduler.wait_for_step() => {
                    self.on_step(info);
                    true
                }
            };
            if !keep_running {
                break;
            }
            self.sync_clock();
        }

        self.game.mesh_mut().disconnect();
        tracing::info!(%peer, "peer actor stopped");
    }

    /// Returns `false` when the peer must stop.
    fn handle_command(&mut self, command: PeerCommand) -> bool {
        match command {
            PeerCommand::SetMode { mode, reply } => {
                self.game.mesh_mut().set_mode(mode);
                let _ = reply.send(());
                true
            }
            PeerCommand::Browsing { start, reply } => {
                let session = self.game.mesh_mut();
                let result = if start {
                    session.start_browsing()
                } else {
                    session.stop_browsing()
                };
                self.reply_session(result, reply)
            }
            PeerCommand::Advertising { start, reply } => {
                let session = self.game.mesh_mut();
                let result = if start {
                    session.start_advertising()
                } else {
                    session.stop_advertising()
                };
                self.reply_session(result, reply)
            }
            PeerCommand::Invite { peer, reply } => {
                let result = self.game.mesh_mut().invite_peer(&peer);
                self.reply_session(result, reply)
            }
            PeerCommand::AnswerInvitation { peer, accept, reply } => {
                let result = self.game.mesh_mut().answer_invitation(&peer, accept);
                self.reply_session(result, reply)
            }
            PeerCommand::FoundPeers { reply } => {
                let _ = reply.send(self.game.mesh().found_peers().to_vec());
                true
            }
            PeerCommand::StartGame { reply } => {
                let _ = reply.send(self.game.start_game());
                true
            }
            PeerCommand::KeyInput { key, reply } => {
                let direction = self.game.process_key_input(&key, &*self.key_bindings);
                let _ = reply.send(direction);
                true
            }
            PeerCommand::Subscribe { reply } => {
                let _ = reply.send(self.game.mesh().subscribe());
                true
            }
            PeerCommand::Info { reply } => {
                let _ = reply.send(self.info());
                true
            }
            PeerCommand::Shutdown => false,
        }
    }

    /// Replies with a session result. A fatal error stops the peer after
    /// the caller has been told.
    fn reply_session(
        &self,
        result: Result<(), SessionError>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    ) -> bool {
        let fatal = result.as_ref().is_err_and(SessionError::is_fatal);
        if let Err(e) = &result {
            if fatal {
                tracing::error!(peer = %self.game.mesh().local_peer(), error = %e, "fatal session error, stopping peer");
            } else {
                tracing::warn!(peer = %self.game.mesh().local_peer(), error = %e, "session command failed");
            }
        }
        let _ = reply.send(result);
        !fatal
    }

    /// Returns `false` when the peer must stop.
    fn handle_event(&mut self, event: TransportEvent) -> bool {
        match self.game.mesh_mut().handle_event(event) {
            Ok(Some(message)) => {
                if let Err(e) = self.game.receive(message) {
                    tracing::warn!(peer = %self.game.mesh().local_peer(), error = %e, "game message rejected");
                }
                true
            }
            Ok(None) => true,
            Err(e) if e.is_fatal() => {
                tracing::error!(peer = %self.game.mesh().local_peer(), error = %e, "session desynchronized, stopping peer");
                false
            }
            Err(e) => {
                tracing::warn!(peer = %self.game.mesh().local_peer(), error = %e, "transport event rejected");
                true
            }
        }
    }

    fn on_start_deadline(&mut self) {
        if let Err(e) = self.game.begin_playing() {
            tracing::warn!(peer = %self.game.mesh().local_peer(), error = %e, "start deadline ignored");
        }
    }

    fn on_step(&mut self, info: StepInfo) {
        if info.overrun {
            tracing::debug!(step = info.step, skipped = info.skipped, "world step overran");
        }
        if let Err(e) = self.game.step() {
            tracing::warn!(step = info.step, error = %e, "world step failed");
        }
    }

    /// Arms the start timer once the game is scheduled and runs the step
    /// scheduler only while playing.
    fn sync_clock(&mut self) {
        if let Some(date) = self.game.take_start_deadline() {
            tracing::debug!(peer = %self.game.mesh().local_peer(), "start timer armed");
            self.start_timer = Some(Box::pin(tokio::time::sleep_until(deadline_instant(date))));
        }

        let playing = self.game.status() == GameStatus::Playing;
        if playing && self.scheduler.is_paused() {
            self.scheduler.resume();
        } else if !playing && !self.scheduler.is_paused() {
            self.scheduler.pause();
        }
    }

    fn info(&self) -> PeerInfo {
        let session = self.game.mesh();
        PeerInfo {
            peer: session.local_peer().clone(),
            mode: session.mode(),
            game_status: self.game.status(),
            connected_peers: session.connected_peers(),
            precedence: session.precedence(),
            start_date: self.game.start_date(),
            steps: self.scheduler.step_count(),
        }
    }
}

/// Completes when the armed start timer fires; pends forever otherwise.
async fn wait_for_start(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}
