//! Three peers on one in-process mesh play a game of snakes until one is
//! left. Each peer steers at random.
//!
//! ```text
//! RUST_LOG=meshplay_game=debug,info cargo run -p duel [identity-file]
//! ```
//!
//! With an identity file the first peer keeps its identity across runs.

use std::time::Duration;

use meshplay::prelude::*;
use rand::Rng;
use tokio::sync::mpsc::UnboundedReceiver;

const PLAYERS: [&str; 3] = ["ada", "grace", "linus"];
const KEYS: [&str; 4] = ["up", "down", "left", "right"];

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

struct Player {
    handle: PeerHandle,
    frames: UnboundedReceiver<ViewEvent>,
}

fn spawn_player(
    network: &MemoryNetwork,
    config: SessionConfig,
) -> Result<Player, MeshplayError> {
    let id = local_identity(&config)?;
    let (transport, events) = network.join(id);
    let (view, frames) = ChannelView::new();
    let handle = PeerHandle::builder()
        .session_config(config)
        .spawn(transport, events, GridStage::new(StageConfig::default()), view);
    Ok(Player { handle, frames })
}

/// The first player hosts; the others browse for it and ask to join.
async fn form_mesh(players: &[Player]) -> Result<(), MeshplayError> {
    let Some((host, guests)) = players.split_first() else {
        return Ok(());
    };
    host.handle.set_mode(Mode::Advertising).await?;
    host.handle.start_advertising().await?;

    for guest in guests {
        guest.handle.set_mode(Mode::Browsing).await?;
        guest.handle.start_browsing().await?;
        while !guest.handle.found_peers().await?.contains(host.handle.peer()) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        guest.handle.invite(host.handle.peer().clone()).await?;
    }

    for player in players {
        while player.handle.connected_peers().await?.len() < players.len() - 1 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Game loop
// ---------------------------------------------------------------------------

async fn all_in(players: &[Player], status: GameStatus) -> Result<bool, MeshplayError> {
    for player in players {
        if player.handle.info().await?.game_status != status {
            return Ok(false);
        }
    }
    Ok(true)
}

fn survivors(frames: &[ViewEvent]) -> Vec<u8> {
    let mut last = std::collections::BTreeMap::new();
    for frame in frames {
        let elements: &[ElementSnapshot] = match frame {
            ViewEvent::SetUp(elements) => elements,
            ViewEvent::Draw(element) => std::slice::from_ref(element),
            ViewEvent::Status(_) => continue,
        };
        for element in elements {
            if let Some(kind) = element.player_type {
                last.insert(kind.0, element.active);
            }
        }
    }
    last.into_iter().filter(|(_, active)| *active).map(|(kind, _)| kind).collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    meshplay::logging::init();
    let identity_path = std::env::args().nth(1).map(std::path::PathBuf::from);

    let network = MemoryNetwork::new();
    let mut players = Vec::new();
    for (i, name) in PLAYERS.iter().enumerate() {
        let config = SessionConfig {
            display_name: (*name).to_string(),
            identity_path: identity_path.clone().filter(|_| i == 0),
            ..SessionConfig::default()
        };
        players.push(spawn_player(&network, config)?);
    }

    form_mesh(&players).await?;
    tracing::info!(players = players.len(), "mesh formed");

    for player in &players {
        player.handle.start_game().await?;
    }

    let mut rng = rand::rng();
    let mut frames: Vec<Vec<ViewEvent>> = players.iter().map(|_| Vec::new()).collect();
    while !all_in(&players, GameStatus::DidEnd).await? {
        tokio::time::sleep(Duration::from_millis(250)).await;
        for (player, seen) in players.iter_mut().zip(frames.iter_mut()) {
            while let Ok(frame) = player.frames.try_recv() {
                seen.push(frame);
            }
            if rng.random_bool(0.3) {
                let key = KEYS[rng.random_range(0..KEYS.len())];
                player.handle.key_input(key).await?;
            }
        }
    }

    for (player, seen) in players.iter_mut().zip(frames.iter_mut()) {
        while let Ok(frame) = player.frames.try_recv() {
            seen.push(frame);
        }
        let info = player.handle.info().await?;
        eprintln!(
            "{}: rank {}, {} steps, {} frames, sees player(s) {:?} standing",
            info.peer,
            info.precedence,
            info.steps,
            seen.len(),
            survivors(seen)
        );
    }

    for player in &players {
        player.handle.shutdown().await?;
        player.handle.closed().await;
    }
    Ok(())
}
