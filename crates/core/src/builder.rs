//! Turns the events of a block range into a certificate.

use crate::{
    next_height_and_previous_ler, Bridge, BuildError, CertificateBuildParams, CertificateInfo,
    CertificateStore, Claim, ExitTree, ExitTreeTx, L1InfoTreeSyncer, L2BridgeSyncer, SourceError,
};
use aggsender_agglayer::{
    calculate_root, BridgeExit, Certificate, CertificateMetadata, ClaimData, ImportedBridgeExit,
    L1InfoTreeLeaf, L1InfoTreeLeafInner, MerkleProof,
};
use alloy_primitives::{address, Address, B256, U256};
use tracing::{debug, error, info};

/// Recipient of the synthetic bridge added for testing.
pub const FAKE_BRIDGE_DESTINATION: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const FAKE_BRIDGE_AMOUNT: u64 = 1000;

/// An exit tree transaction that never commits. It is rolled back by
/// [ScopedExitTreeTx::rollback], or on drop when an error cut the scope short.
struct ScopedExitTreeTx<'a> {
    tx: Option<Box<dyn ExitTreeTx + 'a>>,
}

impl<'a> ScopedExitTreeTx<'a> {
    fn begin(tree: &'a dyn ExitTree) -> Result<Self, SourceError> {
        Ok(Self {
            tx: Some(tree.begin()?),
        })
    }

    fn inner(&mut self) -> Result<&mut Box<dyn ExitTreeTx + 'a>, SourceError> {
        self.tx
            .as_mut()
            .ok_or_else(|| SourceError::Backend("exit tree transaction already ended".to_string()))
    }

    fn add_leaf(&mut self, deposit_count: u32, leaf: B256) -> Result<(), SourceError> {
        self.inner()?.add_leaf(deposit_count, leaf)
    }

    fn root_at_index(&mut self, index: u32) -> Result<B256, SourceError> {
        self.inner()?.root_at_index(index)
    }

    fn rollback(mut self) -> Result<(), SourceError> {
        match self.tx.take() {
            Some(tx) => tx.rollback(),
            None => Ok(()),
        }
    }
}

impl Drop for ScopedExitTreeTx<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            if let Err(err) = tx.rollback() {
                error!(target: "aggsender", %err, "error rolling back the exit tree transaction");
            }
        }
    }
}

/// Builds certificates from the l2 events, the l1 info tree and the last sent certificate.
pub struct CertificateBuilder<'a> {
    l2_syncer: &'a dyn L2BridgeSyncer,
    l1_info_tree: &'a dyn L1InfoTreeSyncer,
    exit_tree: &'a dyn ExitTree,
    store: &'a dyn CertificateStore,
    bridge_metadata_as_hash: bool,
}

impl<'a> CertificateBuilder<'a> {
    pub fn new(
        l2_syncer: &'a dyn L2BridgeSyncer,
        l1_info_tree: &'a dyn L1InfoTreeSyncer,
        exit_tree: &'a dyn ExitTree,
        store: &'a dyn CertificateStore,
        bridge_metadata_as_hash: bool,
    ) -> Self {
        Self {
            l2_syncer,
            l1_info_tree,
            exit_tree,
            store,
            bridge_metadata_as_hash,
        }
    }

    /// Builds the certificate following `last_sent`. When `add_fake_bridge` is
    /// set a synthetic exit is appended and the exit root accounts for it,
    /// without the exit tree keeping it.
    pub async fn build(
        &self,
        params: &CertificateBuildParams,
        last_sent: Option<&CertificateInfo>,
        add_fake_bridge: bool,
    ) -> Result<Certificate, BuildError> {
        if params.is_empty() {
            return Err(BuildError::NoBridgesOrClaims);
        }

        let mut bridge_exits: Vec<BridgeExit> = params
            .bridges
            .iter()
            .map(|bridge| bridge.to_bridge_exit(self.bridge_metadata_as_hash))
            .collect();
        let imported_bridge_exits = self.imported_bridge_exits(&params.claims).await?;

        let new_local_exit_root = if add_fake_bridge {
            info!(target: "aggsender", "adding a fake bridge to the certificate");
            let (root, fake_exit) = self.exit_root_with_fake_bridge(params.max_deposit_count())?;
            bridge_exits.push(fake_exit);
            root
        } else {
            self.l2_syncer
                .exit_root_at_index(params.max_deposit_count())
                .await?
        };

        let (height, prev_local_exit_root) =
            next_height_and_previous_ler(last_sent, |height| {
                self.store.get_certificate_by_height(height)
            })?;

        let offset = u32::try_from(params.to_block - params.from_block).map_err(|_| {
            BuildError::RangeTooWide {
                from: params.from_block,
                to: params.to_block,
            }
        })?;
        let metadata =
            CertificateMetadata::new(params.from_block, offset, params.created_at).to_hash();

        Ok(Certificate {
            network_id: self.l2_syncer.origin_network(),
            height,
            prev_local_exit_root,
            new_local_exit_root,
            bridge_exits,
            imported_bridge_exits,
            metadata,
        })
    }

    /// Proves every claim against the l1 info root of the latest leaf any of them uses.
    async fn imported_bridge_exits(
        &self,
        claims: &[Claim],
    ) -> Result<Vec<ImportedBridgeExit>, BuildError> {
        if claims.is_empty() {
            return Ok(Vec::new());
        }

        let mut leaves = Vec::with_capacity(claims.len());
        for claim in claims {
            let leaf = self
                .l1_info_tree
                .leaf_for_global_exit_root(claim.global_exit_root)
                .await?;
            leaves.push(leaf);
        }
        let greatest_index = leaves
            .iter()
            .map(|leaf| leaf.l1_info_tree_index)
            .max()
            .unwrap_or_default();
        let root_to_prove = self.l1_info_tree.root_at_index(greatest_index).await?;
        debug!(target: "aggsender", greatest_index, %root_to_prove, "proving claims against l1 info root");

        let mut imported = Vec::with_capacity(claims.len());
        for (claim, leaf) in claims.iter().zip(leaves) {
            let ger_proof = self
                .l1_info_tree
                .proof_from_index_to_root(leaf.l1_info_tree_index, root_to_prove)
                .await?;
            imported.push(self.imported_bridge_exit(
                claim,
                &leaf,
                MerkleProof {
                    root: root_to_prove,
                    proof: ger_proof,
                },
            ));
        }
        Ok(imported)
    }

    fn imported_bridge_exit(
        &self,
        claim: &Claim,
        leaf: &L1InfoTreeLeaf,
        proof_ger_l1root: MerkleProof,
    ) -> ImportedBridgeExit {
        let bridge_exit = claim.to_bridge_exit(self.bridge_metadata_as_hash);
        let global_index = claim.global_index();
        let l1_leaf = L1InfoTreeLeaf {
            l1_info_tree_index: leaf.l1_info_tree_index,
            rer: claim.rollup_exit_root,
            mer: claim.mainnet_exit_root,
            inner: L1InfoTreeLeafInner {
                global_exit_root: leaf.inner.global_exit_root,
                block_hash: leaf.inner.block_hash,
                timestamp: leaf.inner.timestamp,
            },
        };

        let claim_data = if global_index.mainnet_flag {
            ClaimData::Mainnet {
                proof_leaf_mer: MerkleProof {
                    root: claim.mainnet_exit_root,
                    proof: claim.proof_local_exit_root,
                },
                proof_ger_l1root,
                l1_leaf,
            }
        } else {
            ClaimData::Rollup {
                proof_leaf_ler: MerkleProof {
                    root: calculate_root(
                        bridge_exit.hash(),
                        &claim.proof_local_exit_root,
                        global_index.leaf_index,
                    ),
                    proof: claim.proof_local_exit_root,
                },
                proof_ler_rer: MerkleProof {
                    root: claim.rollup_exit_root,
                    proof: claim.proof_rollup_exit_root,
                },
                proof_ger_l1root,
                l1_leaf,
            }
        };

        ImportedBridgeExit {
            bridge_exit,
            claim_data,
            global_index,
        }
    }

    /// Root of the exit tree with a synthetic leaf after `max_deposit_count`.
    /// The leaf is written in a transaction that is always rolled back.
    fn exit_root_with_fake_bridge(
        &self,
        max_deposit_count: u32,
    ) -> Result<(B256, BridgeExit), BuildError> {
        let fake_bridge = Bridge {
            destination_address: FAKE_BRIDGE_DESTINATION,
            amount: U256::from(FAKE_BRIDGE_AMOUNT),
            deposit_count: max_deposit_count + 1,
            ..Default::default()
        };

        let mut tx = ScopedExitTreeTx::begin(self.exit_tree)?;
        tx.add_leaf(fake_bridge.deposit_count, fake_bridge.leaf_hash())?;
        let root = tx.root_at_index(fake_bridge.deposit_count)?;
        tx.rollback()?;

        debug!(target: "aggsender", %root, deposit_count = fake_bridge.deposit_count, "exit root with the fake bridge");
        Ok((root, fake_bridge.to_bridge_exit(self.bridge_metadata_as_hash)))
    }
}
