use crate::types::EventKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One unit of streamed output shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamBlock {
    pub agent: String,
    pub event: EventKind,
    pub text: String,
    /// Full backend payload for pass-through kinds, forwarded untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl StreamBlock {
    pub fn new(agent: impl Into<String>, event: EventKind, text: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            event,
            text: text.into(),
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Adjacent blocks merge only when both are chunks from the same agent.
    pub fn merges_with(&self, next: &StreamBlock) -> bool {
        self.event == EventKind::MessageChunk
            && next.event == EventKind::MessageChunk
            && self.agent == next.agent
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get(key))
            .and_then(Value::as_str)
    }
}

/// Result of appending a block to a [`BlockLog`].
#[derive(Debug, Clone, PartialEq)]
pub enum BlockAppend {
    /// A new block was pushed at `index`.
    Started { index: usize },
    /// The text was concatenated onto the existing block at `index`.
    Extended { index: usize },
}

/// Ordered, append-only sequence of blocks for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockLog {
    blocks: Vec<StreamBlock>,
}

impl BlockLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: StreamBlock) -> BlockAppend {
        if let Some(last) = self.blocks.last_mut() {
            if last.merges_with(&block) {
                last.text.push_str(&block.text);
                return BlockAppend::Extended {
                    index: self.blocks.len() - 1,
                };
            }
        }

        self.blocks.push(block);
        BlockAppend::Started {
            index: self.blocks.len() - 1,
        }
    }

    pub fn blocks(&self) -> &[StreamBlock] {
        &self.blocks
    }

    pub fn get(&self, index: usize) -> Option<&StreamBlock> {
        self.blocks.get(index)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
