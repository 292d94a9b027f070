//! Game coordination protocol.
//!
//! One [`GameController`] per peer drives the game through its phases:
//!
//! ```text
//! Idle ──show barrier──→ ModelInit ──all players known──→ ViewInit
//!      ──→ WaitingToScheduleGame ──start deadline──→ Playing ──→ DidEnd
//! ```
//!
//! Peers reach each phase at slightly different times, so a message can
//! arrive before its receiver is ready for it. Every status classifies
//! each event as handle, defer or drop; deferred messages are replayed in
//! arrival order whenever the status changes.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use meshplay_clock::{format_start_date, parse_start_date, start_date_after};
use meshplay_protocol::{
    Direction, ElementVector, EventKind, GameMessages, Message,
    PlayerConfiguration, PlayerType, TargetConfiguration, TargetMode,
};
use meshplay_transport::PeerId;

use crate::{
    AckBarrier, Element, GameConfig, GameError, GameView, KeyBindings,
    PeerMesh, PlayerHandle, Stage,
};

/// Phase of the game on this peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameStatus {
    #[default]
    Idle,
    ModelInit,
    ViewInit,
    WaitingToScheduleGame,
    Playing,
    DidEnd,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::ModelInit => write!(f, "ModelInit"),
            Self::ViewInit => write!(f, "ViewInit"),
            Self::WaitingToScheduleGame => write!(f, "WaitingToScheduleGame"),
            Self::Playing => write!(f, "Playing"),
            Self::DidEnd => write!(f, "DidEnd"),
        }
    }
}

/// What a status does with an incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Handle,
    Defer,
    Drop,
}

impl GameStatus {
    /// Classifies `event` for this status.
    pub fn disposition(self, event: EventKind) -> Disposition {
        use Disposition::{Defer, Drop, Handle};
        use EventKind as E;
        use GameStatus as S;

        match (self, event) {
            (_, E::TestMsg | E::DidScheduleGame) => Handle,

            (S::Idle, E::ShowGameViewController) => Handle,
            (_, E::ShowGameViewController) => Drop,

            (S::Idle, E::InitTarget | E::InitPlayer) => Defer,
            (S::ModelInit, E::InitTarget | E::InitPlayer) => Handle,
            (_, E::InitTarget | E::InitPlayer) => Drop,

            (S::Idle | S::ModelInit, E::ScheduleGame) => Defer,
            (S::ViewInit | S::WaitingToScheduleGame, E::ScheduleGame) => Handle,
            (_, E::ScheduleGame) => Drop,

            (
                S::Playing,
                E::ElementDidMove
                | E::PlayerDidChangeDirection
                | E::PlayerDidCrash
                | E::PlayerDidSecureTarget
                | E::TargetWasSecured
                | E::TargetDidUpdateLocation,
            ) => Handle,
            (
                S::DidEnd,
                E::ElementDidMove
                | E::PlayerDidChangeDirection
                | E::PlayerDidCrash
                | E::PlayerDidSecureTarget
                | E::TargetWasSecured
                | E::TargetDidUpdateLocation,
            ) => Drop,
            (
                _,
                E::ElementDidMove
                | E::PlayerDidChangeDirection
                | E::PlayerDidCrash
                | E::PlayerDidSecureTarget
                | E::TargetWasSecured
                | E::TargetDidUpdateLocation,
            ) => Defer,

            (S::Playing | S::DidEnd, E::GameDidEnd) => Handle,
            (_, E::GameDidEnd) => Defer,
        }
    }
}

/// Drives one peer through a multiplayer game.
pub struct GameController<M, S, V> {
    mesh: M,
    stage: S,
    view: V,
    config: GameConfig,
    status: GameStatus,

    /// Player owned by each peer, the local one included.
    players: BTreeMap<PeerId, PlayerHandle>,

    /// Messages that arrived before this peer could process them.
    deferred: Vec<Message>,

    shown: bool,
    show_barrier: AckBarrier,
    schedule_barrier: AckBarrier,
    end_barrier: AckBarrier,

    start_date: Option<SystemTime>,
    pending_start: Option<SystemTime>,
}

impl<M: PeerMesh, S: Stage, V: GameView> GameController<M, S, V> {
    pub fn new(mesh: M, stage: S, view: V, config: GameConfig) -> Self {
        Self {
            mesh,
            stage,
            view,
            config,
            status: GameStatus::Idle,
            players: BTreeMap::new(),
            deferred: Vec::new(),
            shown: false,
            show_barrier: AckBarrier::new("show"),
            schedule_barrier: AckBarrier::new("schedule"),
            end_barrier: AckBarrier::new("end"),
            start_date: None,
            pending_start: None,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut M {
        &mut self.mesh
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn players(&self) -> &BTreeMap<PeerId, PlayerHandle> {
        &self.players
    }

    pub fn local_player(&self) -> Option<PlayerHandle> {
        self.players.get(self.mesh.local_peer()).copied()
    }

    /// The agreed start date, once scheduled.
    pub fn start_date(&self) -> Option<SystemTime> {
        self.start_date
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    // -- Entry points -------------------------------------------------------

    /// Announces that the local game view is shown and joins the show
    /// barrier. Calling it again is a no-op.
    ///
    /// # Errors
    /// [`GameError::InvalidState`] outside [`GameStatus::Idle`].
    pub fn start_game(&mut self) -> Result<(), GameError> {
        if self.status != GameStatus::Idle {
            return Err(GameError::InvalidState {
                operation: "start_game",
                status: self.status,
            });
        }
        if self.shown {
            return Ok(());
        }

        let show = self.mesh.messages().show_game_view_controller();
        self.mesh.broadcast(&show);
        self.shown = true;
        tracing::info!(peer = %self.mesh.local_peer(), "game view shown");

        self.tracked(|c| c.check_show_barrier())
    }

    /// Feeds one message from the session into the protocol.
    pub fn receive(&mut self, message: Message) -> Result<(), GameError> {
        match self.status.disposition(message.event()) {
            Disposition::Handle => self.tracked(|c| message.dispatch(c)),
            Disposition::Defer => {
                tracing::debug!(
                    status = %self.status,
                    event = %message.event(),
                    sender = %message.sender(),
                    "message deferred"
                );
                self.deferred.push(message);
                Ok(())
            }
            Disposition::Drop => {
                tracing::debug!(
                    status = %self.status,
                    event = %message.event(),
                    sender = %message.sender(),
                    "stale message dropped"
                );
                Ok(())
            }
        }
    }

    /// Returns the start date once after it has been scheduled, so the
    /// caller can arm its timer.
    pub fn take_start_deadline(&mut self) -> Option<SystemTime> {
        self.pending_start.take()
    }

    /// Starts playing. Called when the start deadline fires.
    pub fn begin_playing(&mut self) -> Result<(), GameError> {
        if self.status != GameStatus::WaitingToScheduleGame {
            return Err(GameError::InvalidState {
                operation: "begin_playing",
                status: self.status,
            });
        }
        self.tracked(|c| {
            c.set_status(GameStatus::Playing);
            Ok(())
        })
    }

    /// Advances the world one step and publishes what moved.
    ///
    /// Does nothing unless playing.
    pub fn step(&mut self) -> Result<(), GameError> {
        if self.status != GameStatus::Playing {
            return Ok(());
        }
        self.tracked(|c| {
            let local = c.local_player();
            for element in c.stage.advance(local) {
                if c.status != GameStatus::Playing {
                    break;
                }
                let vector = c.stage.vector_of(element);
                let message = match element {
                    Element::Player(_) => c.mesh.messages().element_did_move(vector),
                    Element::Target => {
                        c.mesh.messages().target_did_update_location(vector)
                    }
                };
                c.mesh.broadcast(&message);
                c.draw(element);
                c.validate(element);
            }
            Ok(())
        })
    }

    /// Turns a key press into a direction change for the local player.
    ///
    /// Returns the new direction, or `None` if the key is unbound, the
    /// game is not running, or the turn would reverse the player.
    pub fn process_key_input(
        &mut self,
        key: &str,
        bindings: &dyn KeyBindings,
    ) -> Option<Direction> {
        if self.status != GameStatus::Playing {
            return None;
        }
        let player = self.local_player()?;
        let direction = bindings.direction_for(key)?;
        let current = self.stage.direction_of(player)?;
        if direction == current || direction == current.opposite() {
            return None;
        }

        self.stage.set_direction(player, direction);
        let message = self
            .mesh
            .messages()
            .player_did_change_direction(ElementVector::heading(direction));
        self.mesh.broadcast(&message);
        tracing::debug!(?direction, "direction changed");
        Some(direction)
    }

    // -- Internals ----------------------------------------------------------

    /// Runs `f`, then replays deferred messages if the status changed.
    fn tracked(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), GameError>,
    ) -> Result<(), GameError> {
        let before = self.status;
        f(self)?;
        if self.status != before {
            self.replay_deferred()?;
        }
        Ok(())
    }

    fn replay_deferred(&mut self) -> Result<(), GameError> {
        let mut i = 0;
        while i < self.deferred.len() {
            match self.status.disposition(self.deferred[i].event()) {
                Disposition::Defer => i += 1,
                Disposition::Drop => {
                    let message = self.deferred.remove(i);
                    tracing::debug!(
                        status = %self.status,
                        event = %message.event(),
                        "deferred message dropped"
                    );
                }
                Disposition::Handle => {
                    let message = self.deferred.remove(i);
                    let before = self.status;
                    tracing::debug!(
                        status = %self.status,
                        event = %message.event(),
                        "replaying deferred message"
                    );
                    message.dispatch(self)?;
                    if self.status != before {
                        i = 0;
                    }
                }
            }
        }
        Ok(())
    }

    fn set_status(&mut self, status: GameStatus) {
        if self.status == status {
            return;
        }
        tracing::info!(peer = %self.mesh.local_peer(), from = %self.status, to = %status, "game status changed");
        self.status = status;
        self.view.status_did_change(status);
    }

    fn draw(&mut self, element: Element) {
        if let Some(snapshot) = self.stage.snapshot(element) {
            self.view.draw_element(&snapshot);
        }
    }

    fn check_show_barrier(&mut self) -> Result<(), GameError> {
        let connected = self.mesh.connected_peers();
        if self.status != GameStatus::Idle
            || !self.shown
            || !self.show_barrier.is_complete(&connected)
        {
            return Ok(());
        }

        tracing::info!(peers = connected.len(), "all players showed the game view");
        self.show_barrier.reset();
        self.set_status(GameStatus::ModelInit);
        if self.mesh.is_highest_precedence() {
            self.set_up_model();
        }
        Ok(())
    }

    /// Coordinator only: places the target and the first player.
    fn set_up_model(&mut self) {
        let locations = self.stage.random_locations(self.config.target_size, None);
        let mut target = TargetConfiguration {
            locations,
            mode: TargetMode::NoUpdate,
        };
        let message = self.mesh.messages().init_target(target.clone());
        self.mesh.broadcast(&message);

        // Only the coordinator moves the target; replicas mirror it.
        target.mode = TargetMode::SelfUpdate;
        self.stage.add_target(&target);
        self.draw(Element::Target);

        self.initialize_player();
        if self.are_all_players_initialized() {
            self.init_view();
        }
    }

    /// Creates the local player and announces it.
    fn initialize_player(&mut self) {
        let direction = self.stage.random_direction();
        let locations = self
            .stage
            .random_locations(self.config.player_size, Some(direction));
        let rank = self.mesh.precedence();
        let config = PlayerConfiguration {
            locations,
            direction,
            player_type: PlayerType(u8::try_from(rank).unwrap_or(u8::MAX)),
        };
        let message = self.mesh.messages().init_player(config.clone());
        self.mesh.broadcast(&message);

        let local = self.mesh.local_peer().clone();
        self.register_player(local, &config);
    }

    /// Adds `peer`'s player to the stage. Returns `false` if it already
    /// has one.
    fn register_player(&mut self, peer: PeerId, config: &PlayerConfiguration) -> bool {
        if self.players.contains_key(&peer) {
            tracing::warn!(%peer, "duplicate player initialization ignored");
            return false;
        }
        let handle = self.stage.add_player(config);
        tracing::debug!(%peer, %handle, player_type = config.player_type.0, "player initialized");
        self.players.insert(peer, handle);
        self.draw(Element::Player(handle));
        true
    }

    fn is_my_initialization_turn(&self) -> bool {
        self.local_player().is_none()
            && self.players.len() == self.mesh.precedence()
    }

    fn are_all_players_initialized(&self) -> bool {
        self.players.len() > self.mesh.connected_peers().len()
    }

    fn init_view(&mut self) {
        self.set_status(GameStatus::ViewInit);
        let elements = self.stage.snapshots();
        self.view.set_up_view(&elements);
        self.set_status(GameStatus::WaitingToScheduleGame);

        if self.mesh.is_highest_precedence() {
            if let Err(e) = self.schedule_game_locally() {
                tracing::error!(error = %e, "failed to schedule game");
            }
        }
    }

    /// Coordinator only: picks the start date and shares it.
    fn schedule_game_locally(&mut self) -> Result<(), GameError> {
        let date = format_start_date(start_date_after(self.config.start_delay));
        let message = self.mesh.messages().schedule_game(date.clone());
        self.mesh.broadcast(&message);
        self.schedule_at(&date)
    }

    fn schedule_at(&mut self, date: &str) -> Result<(), GameError> {
        let start = parse_start_date(date)?;
        self.start_date = Some(start);
        self.pending_start = Some(start);
        tracing::info!(%date, "game scheduled");
        Ok(())
    }

    /// The peer owning the player, or `None` with a warning.
    fn player_of(&self, message: &Message) -> Option<PlayerHandle> {
        let handle = self.players.get(message.sender()).copied();
        if handle.is_none() {
            tracing::warn!(
                sender = %message.sender(),
                event = %message.event(),
                "message for an unknown player ignored"
            );
        }
        handle
    }

    fn vector_in<'m>(&self, message: &'m Message) -> Option<&'m ElementVector> {
        let vector = message.element_vector();
        if vector.is_none() {
            tracing::warn!(
                sender = %message.sender(),
                event = %message.event(),
                "message without element vector ignored"
            );
        }
        vector
    }

    /// Checks terminal conditions after `element` moved.
    fn validate(&mut self, element: Element) {
        // At most one survivor ends the game; zero covers a simultaneous
        // crash of the last two players.
        if self.stage.active_player_count() <= 1 {
            if let Element::Player(handle) = element {
                self.stage.deactivate(handle);
                self.draw(element);
            }
            self.set_status(GameStatus::DidEnd);
            let message = self.mesh.messages().game_did_end();
            self.mesh.broadcast(&message);
            return;
        }

        let Some(local) = self.local_player() else {
            return;
        };
        if element != Element::Player(local) {
            return;
        }

        if self.stage.did_player_crash(local) || self.stage.did_player_eat_itself(local) {
            tracing::info!(peer = %self.mesh.local_peer(), "local player crashed");
            let message = self.mesh.messages().player_did_crash();
            self.mesh.broadcast(&message);
            self.stage.deactivate(local);
            self.draw(element);
        } else if self.stage.did_player_secure_target(local) {
            tracing::info!(peer = %self.mesh.local_peer(), "local player secured the target");
            if let Some(vector) = self.stage.secure_target() {
                let message = self.mesh.messages().target_was_secured(vector);
                self.mesh.broadcast(&message);
                self.draw(Element::Target);
            }
            let message = self.mesh.messages().player_did_secure_target();
            self.mesh.broadcast(&message);
            self.stage.grow_player(local);
        }
    }
}

impl<M: PeerMesh, S: Stage, V: GameView> GameMessages for GameController<M, S, V> {
    type Output = Result<(), GameError>;

    fn test_message(&mut self, message: &Message) -> Self::Output {
        tracing::debug!(sender = %message.sender(), body = ?message.test_body(), "test message");
        Ok(())
    }

    fn did_show_game_view_controller(&mut self, message: &Message) -> Self::Output {
        self.show_barrier.record(message.sender());
        self.check_show_barrier()
    }

    fn schedule_game(&mut self, message: &Message) -> Self::Output {
        if self.start_date.is_some() {
            tracing::debug!(sender = %message.sender(), "game already scheduled, ignoring");
            return Ok(());
        }
        let Some(date) = message.game_start_date() else {
            tracing::warn!(sender = %message.sender(), "schedule without start date ignored");
            return Ok(());
        };

        let ack = self.mesh.messages().did_schedule_game();
        self.mesh.send_to(&ack, std::slice::from_ref(message.sender()));
        self.schedule_at(date)
    }

    fn did_schedule_game(&mut self, message: &Message) -> Self::Output {
        self.schedule_barrier.record(message.sender());
        if self.schedule_barrier.is_complete(&self.mesh.connected_peers()) {
            tracing::info!("all players scheduled the game");
            self.schedule_barrier.reset();
        }
        Ok(())
    }

    fn init_target(&mut self, message: &Message) -> Self::Output {
        let Some(config) = message.target_config() else {
            tracing::warn!(sender = %message.sender(), "target initialization without configuration ignored");
            return Ok(());
        };
        if self.stage.has_target() {
            tracing::warn!(sender = %message.sender(), "duplicate target initialization ignored");
            return Ok(());
        }
        self.stage.add_target(config);
        self.draw(Element::Target);
        Ok(())
    }

    fn init_player(&mut self, message: &Message) -> Self::Output {
        let Some(config) = message.player_config() else {
            tracing::warn!(sender = %message.sender(), "player initialization without configuration ignored");
            return Ok(());
        };
        if !self.register_player(message.sender().clone(), config) {
            return Ok(());
        }

        if self.are_all_players_initialized() {
            self.init_view();
        } else if self.is_my_initialization_turn() {
            self.initialize_player();
            if self.are_all_players_initialized() {
                self.init_view();
            }
        }
        Ok(())
    }

    fn element_did_move(&mut self, message: &Message) -> Self::Output {
        let (Some(handle), Some(vector)) = (self.player_of(message), self.vector_in(message))
        else {
            return Ok(());
        };
        self.stage.apply_vector(handle, vector);
        self.draw(Element::Player(handle));
        self.validate(Element::Player(handle));
        Ok(())
    }

    fn player_did_change_direction(&mut self, message: &Message) -> Self::Output {
        let (Some(handle), Some(vector)) = (self.player_of(message), self.vector_in(message))
        else {
            return Ok(());
        };
        if let Some(direction) = vector.direction {
            self.stage.set_direction(handle, direction);
        }
        Ok(())
    }

    fn player_did_crash(&mut self, message: &Message) -> Self::Output {
        if let Some(handle) = self.player_of(message) {
            self.stage.deactivate(handle);
            self.draw(Element::Player(handle));
        }
        Ok(())
    }

    fn player_did_secure_target(&mut self, message: &Message) -> Self::Output {
        if let Some(handle) = self.player_of(message) {
            self.stage.grow_player(handle);
        }
        Ok(())
    }

    fn target_was_secured(&mut self, message: &Message) -> Self::Output {
        if let Some(vector) = self.vector_in(message) {
            self.stage.set_target_locations(vector.locations.clone());
            self.draw(Element::Target);
        }
        Ok(())
    }

    fn target_did_update_location(&mut self, message: &Message) -> Self::Output {
        if let Some(vector) = self.vector_in(message) {
            self.stage.set_target_locations(vector.locations.clone());
            self.draw(Element::Target);
        }
        Ok(())
    }

    fn game_did_end(&mut self, message: &Message) -> Self::Output {
        self.end_barrier.record(message.sender());
        if self.end_barrier.is_complete(&self.mesh.connected_peers()) {
            tracing::info!("all players ended the game");
            self.end_barrier.reset();
        }
        Ok(())
    }
}
