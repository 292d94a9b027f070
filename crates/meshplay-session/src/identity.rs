//! Persistence of the local peer identity.
//!
//! A device keeps the same [`PeerId`] across runs so other players see a
//! stable lobby entry. The identity is stored as a small JSON document:
//!
//! ```json
//! { "peerIDKey": { "name": "alpha", "uid": 1234 } }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use meshplay_transport::PeerId;
use serde::{Deserialize, Serialize};

use crate::SessionError;

/// Key the identity is stored under.
pub const IDENTITY_KEY: &str = "peerIDKey";

#[derive(Serialize, Deserialize)]
struct IdentityFile {
    #[serde(rename = "peerIDKey")]
    peer: PeerId,
}

/// Loads or creates the local identity at a fixed path.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored identity, if any.
    ///
    /// # Errors
    /// I/O failures other than a missing file, and malformed contents.
    pub fn load(&self) -> Result<Option<PeerId>, SessionError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: IdentityFile = serde_json::from_slice(&bytes)?;
        Ok(Some(file.peer))
    }

    /// Writes `peer` to the store, creating parent directories as needed.
    pub fn save(&self, peer: &PeerId) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(&IdentityFile { peer: peer.clone() })?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Returns the stored identity, or generates one named `display_name`
    /// and saves it.
    ///
    /// A stored identity wins even if its display name differs.
    pub fn load_or_create(&self, display_name: &str) -> Result<PeerId, SessionError> {
        if let Some(peer) = self.load()? {
            tracing::debug!(%peer, path = %self.path.display(), "identity loaded");
            return Ok(peer);
        }
        let peer = PeerId::generate(display_name);
        self.save(&peer)?;
        tracing::info!(%peer, path = %self.path.display(), "identity created");
        Ok(peer)
    }
}
