//! Active client identity and protocol version checks.
//!
//! Exactly one client owns the session at a time. A `client_init` request
//! rotates the active client id; requests carrying any other id are
//! rejected. Two version fields guard against a stale client surviving a
//! server upgrade: the legacy numeric `version` (any non-zero value is
//! stale against this server) and the string `clientVersion` compared
//! verbatim when the server advertises one.

use parking_lot::RwLock;
use uuid::Uuid;

/// The legacy numeric protocol version advertised by this server. Kept at
/// the maximum so every client still sending the legacy field reloads.
pub const LEGACY_PROTOCOL_VERSION: f64 = f64::MAX;

/// Tracks the active client id and the advertised client version.
#[derive(Debug, Default)]
pub struct ClientIdentity {
    active_id: RwLock<Option<String>>,
    client_version: RwLock<String>,
}

impl ClientIdentity {
    /// Create an identity with no active client and no advertised version.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an identity advertising a client version string.
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            active_id: RwLock::new(None),
            client_version: RwLock::new(version.into()),
        }
    }

    /// Rotate the active client id, returning the new id.
    pub fn rotate(&self) -> String {
        let id = Uuid::now_v7().to_string();
        *self.active_id.write() = Some(id.clone());
        id
    }

    /// The current active client id, if a client has initialized.
    pub fn active_id(&self) -> Option<String> {
        self.active_id.read().clone()
    }

    /// Whether `candidate` matches the active client id.
    pub fn is_active(&self, candidate: &str) -> bool {
        self.active_id.read().as_deref() == Some(candidate)
    }

    /// The advertised client version (empty when version checks are off).
    pub fn client_version(&self) -> String {
        self.client_version.read().clone()
    }

    /// Whether `candidate` passes the string version check. An empty
    /// advertised version disables the check; an empty candidate is always
    /// accepted (clients predating the field).
    pub fn version_matches(&self, candidate: &str) -> bool {
        let advertised = self.client_version.read();
        advertised.is_empty() || candidate.is_empty() || *advertised == candidate
    }
}
