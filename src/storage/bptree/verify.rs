use serde::Serialize;
use tracing::debug;

use crate::error::{LeafError, Result};
use crate::storage::block::KeyBlock;

use super::options::InternalLayout;
use super::tree::TreeCore;

const MAX_FINDINGS: usize = 32;

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Suspicious but readable.
    Warning,
    /// Broken invariant; lookups may return wrong results.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Offset of the block the finding is about.
    pub offset: u64,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Totals gathered while walking the tree.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Internal blocks reached from the root.
    pub internal_blocks: u64,
    /// Leaves reached from the root.
    pub indexed_leaves: u64,
    /// Leaves reached only through the sibling chain.
    pub overflow_leaves: u64,
    /// Records found along the leaf chain.
    pub records: u64,
}

/// Complete report of a verification run.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// Whether no error-level finding was recorded.
    pub success: bool,
    /// Height recorded in the metadata block.
    pub height: u32,
    /// Entry count recorded in the metadata block.
    pub entries: u64,
    /// Issues found, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the blocks examined.
    pub counts: VerifyCounts,
}

impl VerifyReport {
    /// Renders the report as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| LeafError::InvalidArgument(format!("report encoding failed: {err}")))
    }
}

struct Walk {
    findings: Vec<VerifyFinding>,
    counts: VerifyCounts,
    leaves: Vec<u64>,
}

impl Walk {
    fn error(&mut self, offset: u64, message: impl Into<String>) {
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(VerifyFinding {
                severity: VerifySeverity::Error,
                offset,
                message: message.into(),
            });
        }
    }

    fn warning(&mut self, offset: u64, message: impl Into<String>) {
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(VerifyFinding {
                severity: VerifySeverity::Warning,
                offset,
                message: message.into(),
            });
        }
    }
}

/// Key interval a block's keys must fall in.
#[derive(Clone, Copy)]
struct Bounds<'k> {
    lower: Option<&'k [u8]>,
    upper: Option<&'k [u8]>,
}

pub(crate) fn verify_tree(core: &mut TreeCore) -> Result<VerifyReport> {
    let mut walk = Walk {
        findings: Vec::new(),
        counts: VerifyCounts::default(),
        leaves: Vec::new(),
    };
    let root = core.meta.root();
    let height = core.meta.height();
    let unbounded = Bounds {
        lower: None,
        upper: None,
    };
    walk_block(core, &mut walk, root, height, unbounded)?;
    walk_chain(core, &mut walk)?;

    let entries = core.meta.entries();
    if walk.counts.records != entries {
        walk.error(
            0,
            format!(
                "metadata counts {entries} entries, leaf chain holds {}",
                walk.counts.records
            ),
        );
    }
    let success = !walk
        .findings
        .iter()
        .any(|finding| finding.severity == VerifySeverity::Error);
    debug!(success, findings = walk.findings.len(), "bptree.verify");
    Ok(VerifyReport {
        success,
        height,
        entries,
        findings: walk.findings,
        counts: walk.counts,
    })
}

fn load_checked(
    core: &mut TreeCore,
    walk: &mut Walk,
    offset: u64,
    level: u32,
) -> Result<Option<KeyBlock>> {
    match core.load(offset, level) {
        Ok(block) => Ok(Some(block)),
        Err(err @ LeafError::Io(_)) => Err(err),
        Err(err) => {
            walk.error(offset, err.to_string());
            Ok(None)
        }
    }
}

fn check_keys(walk: &mut Walk, block: &KeyBlock, bounds: Bounds<'_>) {
    let strict = block.dims().unique_keys();
    for pair in block.records().windows(2) {
        let ordered = if strict {
            pair[0].key() < pair[1].key()
        } else {
            pair[0].key() <= pair[1].key()
        };
        if !ordered {
            walk.error(block.offset(), "records out of order");
            break;
        }
    }
    if let (Some(lower), Some(first)) = (bounds.lower, block.first_key()) {
        if first < lower {
            walk.error(block.offset(), "first key below parent separator");
        }
    }
    if let (Some(upper), Some(last)) = (bounds.upper, block.last_key()) {
        if last >= upper {
            walk.error(block.offset(), "last key at or above next separator");
        }
    }
}

fn walk_block(
    core: &mut TreeCore,
    walk: &mut Walk,
    offset: u64,
    level: u32,
    bounds: Bounds<'_>,
) -> Result<()> {
    let Some(block) = load_checked(core, walk, offset, level)? else {
        return Ok(());
    };
    check_keys(walk, &block, bounds);
    if level == 0 {
        walk.counts.indexed_leaves += 1;
        walk.leaves.push(offset);
        return Ok(());
    }
    walk.counts.internal_blocks += 1;

    let expected_pointers = match core.layout {
        InternalLayout::EqualPointers => block.record_count(),
        InternalLayout::Classic => block.record_count() + 1,
    };
    if block.is_empty() || block.pointer_count() != expected_pointers {
        walk.error(
            offset,
            format!(
                "{} records with {} pointers",
                block.record_count(),
                block.pointer_count()
            ),
        );
        return Ok(());
    }

    let keys: Vec<&[u8]> = block.records().iter().map(|record| record.key()).collect();
    for (slot, &child) in block.pointers().iter().enumerate() {
        let child_bounds = match core.layout {
            InternalLayout::EqualPointers => Bounds {
                lower: Some(keys[slot]),
                upper: keys.get(slot + 1).copied().or(bounds.upper),
            },
            InternalLayout::Classic => Bounds {
                lower: if slot == 0 {
                    bounds.lower
                } else {
                    Some(keys[slot - 1])
                },
                upper: keys.get(slot).copied().or(bounds.upper),
            },
        };
        walk_block(core, walk, child, level - 1, child_bounds)?;
    }
    Ok(())
}

fn walk_chain(core: &mut TreeCore, walk: &mut Walk) -> Result<()> {
    let Some(&first) = walk.leaves.first() else {
        return Ok(());
    };
    let block_size = core.leaf_dims.block_size() as u64;
    let max_blocks = core.store.size() / block_size;
    let mut indexed = walk.leaves.clone().into_iter().peekable();
    let mut previous_last: Option<Vec<u8>> = None;
    let mut next = Some(first);
    let mut visited = 0u64;

    while let Some(offset) = next {
        visited += 1;
        if visited > max_blocks {
            walk.error(offset, "leaf chain loops");
            return Ok(());
        }
        let Some(leaf) = load_checked(core, walk, offset, 0)? else {
            return Ok(());
        };
        if indexed.peek() == Some(&offset) {
            indexed.next();
        } else {
            walk.counts.overflow_leaves += 1;
            if leaf.is_empty() {
                walk.warning(offset, "empty leaf outside the index");
            }
        }
        if let (Some(prev), Some(first_key)) = (previous_last.as_deref(), leaf.first_key()) {
            if first_key < prev {
                walk.error(offset, "leaf chain goes backwards");
            }
        }
        walk.counts.records += leaf.record_count() as u64;
        if let Some(last) = leaf.last_key() {
            previous_last = Some(last.to_vec());
        }
        next = leaf.extra();
    }

    if let Some(missing) = indexed.next() {
        walk.error(missing, "indexed leaf not reachable through the leaf chain");
    }
    Ok(())
}
