// Shared identity type for every clock variant. The byte layout is what goes on the
// wire; the UUID form is what shows up in configs and logs.

use std::fmt;
use uuid::Uuid;

/// Length in bytes of a packed node identity.
pub const NODE_ID_LEN: usize = 16;

/// Identity of the node that owns a clock instance.
///
/// Serializes as a hyphenated UUID string in human-readable formats so that options
/// files stay legible.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(from = "Uuid", into = "Uuid")]
pub struct NodeId(pub [u8; NODE_ID_LEN]);

impl NodeId {
    /// Generates a fresh random (v4) identity.
    pub fn generate() -> Self {
        NodeId(*Uuid::new_v4().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Timing-safe comparison, used wherever clock logic gates on identity.
    #[inline]
    pub fn same_as(&self, other: &NodeId) -> bool {
        crate::misc::bytes_are_same(&self.0, &other.0)
    }
}

impl From<Uuid> for NodeId {
    fn from(value: Uuid) -> Self {
        NodeId(*value.as_bytes())
    }
}

impl From<NodeId> for Uuid {
    fn from(value: NodeId) -> Self {
        Uuid::from_bytes(value.0)
    }
}

impl From<[u8; NODE_ID_LEN]> for NodeId {
    fn from(value: [u8; NODE_ID_LEN]) -> Self {
        NodeId(value)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", Uuid::from_bytes(self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Uuid::from_bytes(self.0), f)
    }
}
