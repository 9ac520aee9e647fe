use serde::{Deserialize, Serialize};

use crate::domain::ChunkRecord;

pub mod citations;

pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 3500;

pub(crate) const BLOCK_SEPARATOR: &str = "\n\n";

/// Rendered evidence context plus how many ranked records made it in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssembledContext {
    pub text: String,
    pub included: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Character length used by the minimum-evidence gate.
    pub fn char_len(&self) -> usize {
        evidence_char_len(&self.text)
    }
}

pub fn evidence_char_len(context: &str) -> usize {
    context.trim().chars().count()
}

/// Render one self-contained evidence block numbered `source_id`.
pub fn render_block(source_id: u32, chunk: &ChunkRecord) -> String {
    format!(
        "SOURCE [{source_id}]\nCompany: {}\nDocument: {}\nPages: {}\nContent:\n\"\"\"\n{}\n\"\"\"",
        chunk.company,
        chunk.document_label(),
        chunk.page_range(),
        chunk.text.trim()
    )
}

/// Build the budgeted evidence context from already-ranked, already-truncated records.
///
/// The first block is always kept, even when it alone exceeds `max_chars`.
/// Assembly stops at the first later block that would overflow the budget;
/// blocks are never cut. The budget counts block characters only, not the
/// blank-line separators.
pub fn assemble_context(records: &[ChunkRecord], max_chars: usize) -> AssembledContext {
    let mut blocks: Vec<String> = Vec::new();
    let mut total = 0usize;

    for (i, chunk) in records.iter().enumerate() {
        let block = render_block(i as u32 + 1, chunk);
        let len = block.chars().count();
        if !blocks.is_empty() && total + len > max_chars {
            break;
        }
        total += len;
        blocks.push(block);
    }

    AssembledContext {
        included: blocks.len(),
        text: blocks.join(BLOCK_SEPARATOR),
    }
}
