//! Collaborators the sender reads bridge activity and proofs from.

use crate::{Bridge, Claim, SourceError};
use aggsender_agglayer::{L1InfoTreeLeaf, Proof};
use alloy_primitives::B256;
use async_trait::async_trait;

/// Bridge events indexed from the l2 network the sender certifies.
#[async_trait]
pub trait L2BridgeSyncer: Send + Sync {
    /// Network id of the l2.
    fn origin_network(&self) -> u32;

    /// Last l2 block whose events are fully indexed.
    async fn last_processed_block(&self) -> Result<u64, SourceError>;

    /// Outbound bridge events in `[from_block, to_block]`, in emission order.
    async fn bridges_in_range(&self, from_block: u64, to_block: u64)
        -> Result<Vec<Bridge>, SourceError>;

    /// Inbound claim events in `[from_block, to_block]`, in emission order.
    async fn claims_in_range(&self, from_block: u64, to_block: u64)
        -> Result<Vec<Claim>, SourceError>;

    /// Local exit root once the leaf at `deposit_count` was appended.
    async fn exit_root_at_index(&self, deposit_count: u32) -> Result<B256, SourceError>;
}

/// The l1 info tree indexed from l1.
#[async_trait]
pub trait L1InfoTreeSyncer: Send + Sync {
    /// The leaf whose global exit root is `global_exit_root`.
    async fn leaf_for_global_exit_root(
        &self,
        global_exit_root: B256,
    ) -> Result<L1InfoTreeLeaf, SourceError>;

    /// Sibling path of the leaf at `index` in the tree whose root is `root`.
    async fn proof_from_index_to_root(&self, index: u32, root: B256)
        -> Result<Proof, SourceError>;

    /// Root of the tree once the leaf at `index` was appended.
    async fn root_at_index(&self, index: u32) -> Result<B256, SourceError>;
}

/// The local exit tree, written inside transactions.
pub trait ExitTree: Send + Sync {
    fn begin(&self) -> Result<Box<dyn ExitTreeTx + '_>, SourceError>;
}

/// A transaction on the [ExitTree]. Writes are only visible through the
/// transaction itself until it ends.
pub trait ExitTreeTx: Send {
    fn add_leaf(&mut self, deposit_count: u32, leaf: B256) -> Result<(), SourceError>;

    fn root_at_index(&self, index: u32) -> Result<B256, SourceError>;

    /// Discards every write done through the transaction.
    fn rollback(self: Box<Self>) -> Result<(), SourceError>;
}
