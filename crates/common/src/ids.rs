use serde::{Deserialize, Serialize};

/// Dense per-object handle handed out by the owning replication system.
///
/// Handles are small integers that grow monotonically; storage indexed by
/// them is expected to grow with the handle space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectIndex(pub u32);

impl ObjectIndex {
    /// The handle as a storage index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ObjectIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Identifier of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Handle of a relevancy filter registered with the replication driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilterHandle(pub u16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_index_orders_by_value() {
        let mut ids = vec![ObjectIndex(7), ObjectIndex(1), ObjectIndex(3)];
        ids.sort();
        assert_eq!(ids, vec![ObjectIndex(1), ObjectIndex(3), ObjectIndex(7)]);
        assert_eq!(ObjectIndex(3).index(), 3);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(ObjectIndex(12).to_string(), "obj#12");
        assert_eq!(ConnectionId(4).to_string(), "conn#4");
    }
}
