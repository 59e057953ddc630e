//! Applying a clinician's edited block list to the stored one.

use crate::block::{Block, BlockContent, Citation};
use crate::error::{DischargerError, Result};
use serde::Deserialize;
use std::collections::HashSet;

/// A block as submitted by a client. Metadata is server-owned; only `id`
/// is read to match the draft with a stored block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(flatten)]
    pub content: BlockContent,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// Merge `drafts` onto `existing`, in draft order.
///
/// Matched blocks keep their metadata and get `version + 1` and a new
/// `updatedAt` only when title, content or citations changed. Drafts without
/// a known id become new blocks. Dropping a required block, changing a
/// non-editable one or repeating an id is rejected.
pub fn reconcile_blocks(existing: &[Block], drafts: Vec<BlockDraft>, now: &str) -> Result<Vec<Block>> {
    let mut seen = HashSet::new();
    for id in drafts.iter().filter_map(|d| d.id.as_deref()) {
        if !seen.insert(id) {
            return Err(DischargerError::DuplicateBlockId(id.to_string()));
        }
    }

    if let Some(dropped) = existing
        .iter()
        .find(|b| b.is_required && !seen.contains(b.id.as_str()))
    {
        return Err(DischargerError::RequiredBlockRemoved(dropped.id.clone()));
    }

    drafts
        .into_iter()
        .map(|draft| {
            let current = draft
                .id
                .as_deref()
                .and_then(|id| existing.iter().find(|b| b.id == id));

            let Some(current) = current else {
                let mut block = Block::new(draft.title, draft.content, now);
                block.citations = draft.citations;
                return Ok(block);
            };

            let changed = current.title != draft.title
                || current.content != draft.content
                || current.citations != draft.citations;
            if !changed {
                return Ok(current.clone());
            }
            if !current.is_editable {
                return Err(DischargerError::BlockNotEditable(current.id.clone()));
            }

            let mut block = current.clone();
            block.title = draft.title;
            block.content = draft.content;
            block.citations = draft.citations;
            block.version += 1;
            block.updated_at = now.to_string();
            Ok(block)
        })
        .collect()
}
