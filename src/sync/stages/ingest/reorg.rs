use std::collections::HashMap;

use bitcoin::BlockHash;
use tracing::debug;

use super::IngestError;
use crate::{
    rpc::{NodeRpc, types::BlockInfo},
    storage::model::BlockSummary,
};

/// Where a new block's chain meets the cached blocks
#[derive(Debug, Clone)]
pub struct ForkPoint {
    pub ancestor: BlockSummary,
    /// Canonical blocks between the ancestor and the new block, oldest first
    pub canonical: Vec<BlockInfo>,
}

/// Walk back from `start` through the node's block parents until a cached
/// block is reached. Gives up after `max_hops` node lookups, or at a block
/// with no parent.
pub async fn find_common_ancestor(
    rpc: &dyn NodeRpc,
    cached: &[BlockSummary],
    start: Option<BlockHash>,
    max_hops: usize,
) -> Result<ForkPoint, IngestError> {
    let by_hash: HashMap<BlockHash, &BlockSummary> = cached.iter().map(|b| (b.hash, b)).collect();

    let mut visited = Vec::new();
    let mut cursor = start;

    loop {
        let Some(hash) = cursor else {
            return Err(IngestError::NoCommonAncestor);
        };

        if let Some(ancestor) = by_hash.get(&hash) {
            visited.reverse();

            return Ok(ForkPoint {
                ancestor: (*ancestor).clone(),
                canonical: visited,
            });
        }

        if visited.len() >= max_hops {
            return Err(IngestError::ReorgSafetyLimitExceeded { hops: visited.len() });
        }

        let info = rpc.get_block_info(&hash).await?;
        debug!(height = info.height, %hash, "walking back from fork");

        cursor = info.previousblockhash;
        visited.push(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{FakeNode, chain};

    #[tokio::test]
    async fn stops_at_first_cached_block() {
        let node = FakeNode::new();
        let blocks = chain(&node, 10, 20, None);
        let cached = blocks[..3]
            .iter()
            .map(crate::sync::summaries::block_summary)
            .collect::<Vec<_>>();

        let fork = find_common_ancestor(&node, &cached, Some(blocks[5].hash), 100)
            .await
            .unwrap();

        assert_eq!(fork.ancestor.height, 12);
        assert_eq!(
            fork.canonical.iter().map(|b| b.height).collect::<Vec<_>>(),
            vec![13, 14, 15]
        );
    }

    #[tokio::test]
    async fn gives_up_past_the_hop_limit() {
        let node = FakeNode::new();
        let blocks = chain(&node, 10, 20, None);
        let cached = vec![crate::sync::summaries::block_summary(&blocks[0])];

        let result = find_common_ancestor(&node, &cached, Some(blocks[10].hash), 5).await;

        assert!(matches!(
            result,
            Err(IngestError::ReorgSafetyLimitExceeded { hops: 5 })
        ));
    }

    #[tokio::test]
    async fn reaching_the_first_block_is_an_error() {
        let node = FakeNode::new();
        let blocks = chain(&node, 0, 3, None);

        let result = find_common_ancestor(&node, &[], Some(blocks[2].hash), 100).await;

        assert!(matches!(result, Err(IngestError::NoCommonAncestor)));
    }
}
