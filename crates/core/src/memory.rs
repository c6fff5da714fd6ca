//! In-memory collaborators: event sources, trees and an agglayer. They back the
//! tests and the event replay mode of the binary.

use crate::{
    merkle::AppendOnlyTree, Bridge, Claim, ExitTree, ExitTreeTx, L1InfoTreeSyncer,
    L2BridgeSyncer, SourceError,
};
use aggsender_agglayer::{
    AgglayerClient, AgglayerError, CertificateHeader, CertificateStatus, L1InfoTreeLeaf, Proof,
    SignedCertificate,
};
use alloy_primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, RwLock,
    },
};

fn backend_error(e: impl ToString) -> SourceError {
    SourceError::Backend(e.to_string())
}

/// Bridge activity to replay, as read from a json file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEvents {
    pub network_id: u32,
    pub last_processed_block: u64,
    #[serde(default)]
    pub bridges: Vec<Bridge>,
    #[serde(default)]
    pub claims: Vec<Claim>,
    #[serde(default)]
    pub l1_info_tree: Vec<L1InfoTreeLeaf>,
}

impl BridgeEvents {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path).map_err(backend_error)?;
        serde_json::from_str(&contents).map_err(backend_error)
    }
}

#[derive(Debug, Default)]
struct L2State {
    last_processed_block: u64,
    bridges: Vec<Bridge>,
    claims: Vec<Claim>,
    exit_tree: AppendOnlyTree,
}

/// L2 event source holding its local exit tree.
#[derive(Debug, Default)]
pub struct MemoryBridgeSyncer {
    network_id: u32,
    state: RwLock<L2State>,
    rollbacks: AtomicUsize,
}

impl MemoryBridgeSyncer {
    pub fn new(network_id: u32) -> Self {
        Self {
            network_id,
            ..Default::default()
        }
    }

    pub fn from_events(events: &BridgeEvents) -> Result<Self, SourceError> {
        let syncer = Self::new(events.network_id);
        let mut bridges = events.bridges.clone();
        bridges.sort_by_key(|bridge| bridge.deposit_count);
        for bridge in bridges {
            syncer.add_bridge(bridge)?;
        }
        for claim in &events.claims {
            syncer.add_claim(claim.clone())?;
        }
        syncer.set_last_processed_block(events.last_processed_block)?;
        Ok(syncer)
    }

    /// Records a bridge event and appends its leaf to the exit tree.
    pub fn add_bridge(&self, bridge: Bridge) -> Result<(), SourceError> {
        let mut state = self.state.write().map_err(backend_error)?;
        state
            .exit_tree
            .add_leaf(bridge.deposit_count, bridge.leaf_hash())?;
        state.bridges.push(bridge);
        Ok(())
    }

    pub fn add_claim(&self, claim: Claim) -> Result<(), SourceError> {
        self.state.write().map_err(backend_error)?.claims.push(claim);
        Ok(())
    }

    pub fn set_last_processed_block(&self, block: u64) -> Result<(), SourceError> {
        self.state.write().map_err(backend_error)?.last_processed_block = block;
        Ok(())
    }

    /// Number of exit tree transactions rolled back so far.
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl L2BridgeSyncer for MemoryBridgeSyncer {
    fn origin_network(&self) -> u32 {
        self.network_id
    }

    async fn last_processed_block(&self) -> Result<u64, SourceError> {
        Ok(self.state.read().map_err(backend_error)?.last_processed_block)
    }

    async fn bridges_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Bridge>, SourceError> {
        let state = self.state.read().map_err(backend_error)?;
        Ok(state
            .bridges
            .iter()
            .filter(|bridge| bridge.block_num >= from_block && bridge.block_num <= to_block)
            .cloned()
            .collect())
    }

    async fn claims_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Claim>, SourceError> {
        let state = self.state.read().map_err(backend_error)?;
        Ok(state
            .claims
            .iter()
            .filter(|claim| claim.block_num >= from_block && claim.block_num <= to_block)
            .cloned()
            .collect())
    }

    async fn exit_root_at_index(&self, deposit_count: u32) -> Result<B256, SourceError> {
        self.state
            .read()
            .map_err(backend_error)?
            .exit_tree
            .root_at_index(deposit_count)
    }
}

impl ExitTree for MemoryBridgeSyncer {
    fn begin(&self) -> Result<Box<dyn ExitTreeTx + '_>, SourceError> {
        let tree = self.state.read().map_err(backend_error)?.exit_tree.clone();
        Ok(Box::new(MemoryExitTreeTx {
            tree,
            rollbacks: &self.rollbacks,
        }))
    }
}

/// Works on a private copy of the tree, so its writes are never visible outside.
struct MemoryExitTreeTx<'a> {
    tree: AppendOnlyTree,
    rollbacks: &'a AtomicUsize,
}

impl ExitTreeTx for MemoryExitTreeTx<'_> {
    fn add_leaf(&mut self, deposit_count: u32, leaf: B256) -> Result<(), SourceError> {
        self.tree.add_leaf(deposit_count, leaf)
    }

    fn root_at_index(&self, index: u32) -> Result<B256, SourceError> {
        self.tree.root_at_index(index)
    }

    fn rollback(self: Box<Self>) -> Result<(), SourceError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct L1State {
    leaves: Vec<L1InfoTreeLeaf>,
    tree: AppendOnlyTree,
}

/// L1 info tree built from the leaves pushed into it.
#[derive(Debug, Default)]
pub struct MemoryL1InfoTree {
    state: RwLock<L1State>,
}

impl MemoryL1InfoTree {
    pub fn new(leaves: impl IntoIterator<Item = L1InfoTreeLeaf>) -> Result<Self, SourceError> {
        let tree = Self::default();
        for leaf in leaves {
            tree.add_leaf(leaf)?;
        }
        Ok(tree)
    }

    /// Appends a leaf, assigning its index. Returns the leaf as stored.
    pub fn add_leaf(&self, mut leaf: L1InfoTreeLeaf) -> Result<L1InfoTreeLeaf, SourceError> {
        let mut state = self.state.write().map_err(backend_error)?;
        leaf.l1_info_tree_index = state.leaves.len() as u32;
        state
            .tree
            .add_leaf(leaf.l1_info_tree_index, leaf.inner.hash())?;
        state.leaves.push(leaf);
        Ok(leaf)
    }
}

#[async_trait]
impl L1InfoTreeSyncer for MemoryL1InfoTree {
    async fn leaf_for_global_exit_root(
        &self,
        global_exit_root: B256,
    ) -> Result<L1InfoTreeLeaf, SourceError> {
        let state = self.state.read().map_err(backend_error)?;
        state
            .leaves
            .iter()
            .find(|leaf| leaf.inner.global_exit_root == global_exit_root)
            .copied()
            .ok_or_else(|| SourceError::NotFound(format!("l1 info leaf for {global_exit_root}")))
    }

    async fn proof_from_index_to_root(
        &self,
        index: u32,
        root: B256,
    ) -> Result<Proof, SourceError> {
        let state = self.state.read().map_err(backend_error)?;
        let count = state
            .tree
            .count_for_root(root)
            .ok_or_else(|| SourceError::NotFound(format!("l1 info root {root}")))?;
        state.tree.proof(index, count)
    }

    async fn root_at_index(&self, index: u32) -> Result<B256, SourceError> {
        self.state.read().map_err(backend_error)?.tree.root_at_index(index)
    }
}

#[derive(Debug, Default)]
struct AgglayerState {
    headers: HashMap<B256, CertificateHeader>,
    latest: HashMap<u32, B256>,
    received: Vec<SignedCertificate>,
}

/// Agglayer keeping certificates in memory. It checks heights the way the
/// real one does and leaves every certificate pending until told otherwise.
#[derive(Debug, Default)]
pub struct MemoryAgglayer {
    state: Mutex<AgglayerState>,
    unavailable: AtomicBool,
}

impl MemoryAgglayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set every call fails as if the agglayer could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Changes the status of a known certificate, returning false when unknown.
    pub fn set_status(&self, certificate_id: B256, status: CertificateStatus) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        match state.headers.get_mut(&certificate_id) {
            Some(header) => {
                header.status = status;
                true
            }
            None => false,
        }
    }

    /// Makes the agglayer know a certificate, as the latest of its network.
    pub fn insert_header(&self, header: CertificateHeader) {
        if let Ok(mut state) = self.state.lock() {
            state.latest.insert(header.network_id, header.certificate_id);
            state.headers.insert(header.certificate_id, header);
        }
    }

    /// Certificates accepted so far, in submission order.
    pub fn received(&self) -> Vec<SignedCertificate> {
        self.state
            .lock()
            .map(|state| state.received.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, AgglayerState>, AgglayerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AgglayerError::Unavailable("agglayer is down".to_string()));
        }
        self.state
            .lock()
            .map_err(|e| AgglayerError::Unavailable(e.to_string()))
    }
}

fn height_rejected(message: String) -> AgglayerError {
    AgglayerError::Rpc {
        code: -32602,
        message,
    }
}

#[async_trait]
impl AgglayerClient for MemoryAgglayer {
    async fn send_certificate(
        &self,
        certificate: &SignedCertificate,
    ) -> Result<B256, AgglayerError> {
        let mut state = self.lock()?;
        let network_id = certificate.certificate.network_id;
        let height = certificate.certificate.height;

        let latest = state
            .latest
            .get(&network_id)
            .and_then(|id| state.headers.get(id));
        let expected = match latest {
            None => 0,
            Some(header) if header.status.is_open() => {
                return Err(height_rejected(format!(
                    "certificate at height {} is still pending",
                    header.height
                )))
            }
            Some(header) if header.status.is_in_error() => header.height,
            Some(header) => header.height + 1,
        };
        if height != expected {
            return Err(height_rejected(format!(
                "unexpected height {height}, expected {expected}"
            )));
        }

        let certificate_id = certificate.certificate.hash();
        let header = CertificateHeader {
            network_id,
            height,
            epoch_number: None,
            certificate_index: None,
            certificate_id,
            prev_local_exit_root: Some(certificate.certificate.prev_local_exit_root),
            new_local_exit_root: certificate.certificate.new_local_exit_root,
            metadata: certificate.certificate.metadata,
            status: CertificateStatus::Pending,
            error: None,
        };
        state.latest.insert(network_id, certificate_id);
        state.headers.insert(certificate_id, header);
        state.received.push(certificate.clone());
        Ok(certificate_id)
    }

    async fn get_certificate_header(
        &self,
        certificate_id: B256,
    ) -> Result<CertificateHeader, AgglayerError> {
        self.lock()?
            .headers
            .get(&certificate_id)
            .cloned()
            .ok_or(AgglayerError::CertificateNotFound(certificate_id))
    }

    async fn get_latest_known_certificate_header(
        &self,
        network_id: u32,
    ) -> Result<Option<CertificateHeader>, AgglayerError> {
        let state = self.lock()?;
        Ok(state
            .latest
            .get(&network_id)
            .and_then(|id| state.headers.get(id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggsender_agglayer::{calculate_root, L1InfoTreeLeafInner};

    fn l1_leaf(byte: u8) -> L1InfoTreeLeaf {
        L1InfoTreeLeaf {
            inner: L1InfoTreeLeafInner {
                global_exit_root: B256::repeat_byte(byte),
                block_hash: B256::repeat_byte(byte + 100),
                timestamp: byte as u64,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_l1_info_tree_proofs() {
        let tree = MemoryL1InfoTree::new((1..=4).map(l1_leaf)).unwrap();
        let leaf = tree
            .leaf_for_global_exit_root(B256::repeat_byte(2))
            .await
            .unwrap();
        assert_eq!(leaf.l1_info_tree_index, 1);

        let root = tree.root_at_index(3).await.unwrap();
        let proof = tree.proof_from_index_to_root(1, root).await.unwrap();
        assert_eq!(calculate_root(leaf.inner.hash(), &proof, 1), root);

        assert!(tree
            .leaf_for_global_exit_root(B256::repeat_byte(9))
            .await
            .is_err());
        assert!(tree
            .proof_from_index_to_root(1, B256::repeat_byte(9))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_exit_tree_tx_is_isolated() {
        let syncer = MemoryBridgeSyncer::new(1);
        syncer
            .add_bridge(Bridge {
                deposit_count: 0,
                ..Default::default()
            })
            .unwrap();
        let committed = syncer.exit_root_at_index(0).await.unwrap();

        let mut tx = syncer.begin().unwrap();
        tx.add_leaf(1, B256::repeat_byte(1)).unwrap();
        let speculative = tx.root_at_index(1).unwrap();
        assert!(syncer.exit_root_at_index(1).await.is_err());
        tx.rollback().unwrap();

        assert_ne!(speculative, committed);
        assert_eq!(syncer.exit_root_at_index(0).await.unwrap(), committed);
        assert_eq!(syncer.rollbacks(), 1);
    }

    #[test]
    fn test_events_json() {
        let json = r#"{"network_id": 3, "last_processed_block": 12}"#;
        let events: BridgeEvents = serde_json::from_str(json).unwrap();
        assert_eq!(events.network_id, 3);
        assert!(events.bridges.is_empty());
        let syncer = MemoryBridgeSyncer::from_events(&events).unwrap();
        assert_eq!(syncer.origin_network(), 3);
    }
}
