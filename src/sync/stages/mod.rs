pub mod events;
pub mod ingest;

pub const TOPIC_RAW_BLOCK: &str = "rawblock";
pub const TOPIC_RAW_TX: &str = "rawtx";

/// A notification pushed by the node, carrying the serialized block or
/// transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    RawBlock(Vec<u8>),
    RawTx(Vec<u8>),
}

impl NodeEvent {
    pub fn from_topic(topic: &[u8], payload: Vec<u8>) -> Option<Self> {
        match topic {
            t if t == TOPIC_RAW_BLOCK.as_bytes() => Some(NodeEvent::RawBlock(payload)),
            t if t == TOPIC_RAW_TX.as_bytes() => Some(NodeEvent::RawTx(payload)),
            _ => None,
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            NodeEvent::RawBlock(_) => TOPIC_RAW_BLOCK,
            NodeEvent::RawTx(_) => TOPIC_RAW_TX,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            NodeEvent::RawBlock(bytes) | NodeEvent::RawTx(bytes) => bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_topics_only() {
        assert_eq!(
            NodeEvent::from_topic(b"rawblock", vec![1]),
            Some(NodeEvent::RawBlock(vec![1]))
        );
        assert_eq!(
            NodeEvent::from_topic(b"rawtx", vec![2]).map(|e| e.topic()),
            Some("rawtx")
        );
        assert_eq!(NodeEvent::from_topic(b"hashblock", vec![3]), None);
    }
}
