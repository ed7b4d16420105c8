//! Master coordinator capability
//!
//! Leader election happens elsewhere; the reader only asks whether this node
//! is currently the master. `is_master` is `None` while the coordinator is
//! still waiting for a stable value, in which case any records off the topic
//! are writes performed by another node.

/// Answer from the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterInfo {
    /// Whether this node is the master; `None` while election is unsettled
    pub is_master: Option<bool>,
    /// Election generation the answer belongs to
    pub generation: i64,
}

/// Injected capability deciding which node accepts direct writes
pub trait MasterCoordinator: Send + Sync {
    fn get_master_info(&self) -> MasterInfo;
}

#[cfg(test)]
pub(crate) struct StaticCoordinator(pub MasterInfo);

#[cfg(test)]
impl MasterCoordinator for StaticCoordinator {
    fn get_master_info(&self) -> MasterInfo {
        self.0
    }
}
