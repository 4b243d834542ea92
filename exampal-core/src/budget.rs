//! Content budgeter: bounds the material text embedded in a prompt.
//!
//! All lengths are character counts. Truncation always keeps a prefix and
//! appends [`TRUNCATION_MARKER`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::MaterialDescriptor;

/// Appended wherever text was cut.
pub const TRUNCATION_MARKER: &str = "... [content truncated]";

/// Header name used for materials without a display name.
pub const UNNAMED_MATERIAL: &str = "Unnamed material";

/// Character caps for one prompt feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetPolicy {
    /// Flat cap per material, used while the raw total fits `total_cap`.
    pub per_item_cap: usize,
    /// Raw total above which every material gets a proportional share.
    pub total_cap: usize,
    /// Hard cap over the assembled text, headers and markers included.
    pub final_cap: usize,
}

impl BudgetPolicy {
    /// Characters each material may keep, given the raw lengths of all of
    /// them.
    ///
    /// When the raw total exceeds `total_cap`, every item is allotted
    /// `floor(total_cap * len / total)`, including items that would have
    /// fit under the flat cap.
    pub fn allotments(&self, lengths: &[usize]) -> Vec<usize> {
        let total: usize = lengths.iter().sum();
        if total > self.total_cap {
            lengths
                .iter()
                .map(|&len| {
                    let share = (self.total_cap as u128 * len as u128) / total as u128;
                    share as usize
                })
                .collect()
        } else {
            lengths
                .iter()
                .map(|&len| len.min(self.per_item_cap))
                .collect()
        }
    }

    /// Assemble the headed, truncated material text for a prompt.
    pub fn apply(&self, materials: &[MaterialDescriptor]) -> String {
        let texts: Vec<String> = materials.iter().map(MaterialDescriptor::text).collect();
        let lengths: Vec<usize> = texts.iter().map(|t| t.chars().count()).collect();
        let allotments = self.allotments(&lengths);

        let mut assembled = String::new();
        for ((material, text), allotment) in materials.iter().zip(&texts).zip(allotments) {
            let name = if material.name.is_empty() {
                UNNAMED_MATERIAL
            } else {
                material.name.as_str()
            };
            assembled.push_str("--- ");
            assembled.push_str(name);
            assembled.push_str(" ---\n");
            assembled.push_str(&truncate_chars(text, allotment));
            assembled.push_str("\n\n");
        }

        let raw_total: usize = lengths.iter().sum();
        let assembled = cap_total(assembled, self.final_cap);
        debug!(
            materials = materials.len(),
            raw_chars = raw_total,
            budgeted_chars = assembled.chars().count(),
            "Budgeted material text"
        );
        assembled
    }
}

/// Keep the first `limit` characters of `text`, marking the cut. Text
/// within the limit is returned unchanged.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => {
            let mut cut = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            cut.push_str(&text[..byte_idx]);
            cut.push_str(TRUNCATION_MARKER);
            cut
        }
        None => text.to_string(),
    }
}

/// Cut the assembled text so that, marker included, it fits `final_cap`.
fn cap_total(text: String, final_cap: usize) -> String {
    if text.chars().count() <= final_cap {
        return text;
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if final_cap < marker_len {
        return text.chars().take(final_cap).collect();
    }
    truncate_chars(&text, final_cap - marker_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Extraction;
    use crate::types::MaterialKind;
    use std::path::PathBuf;

    fn material(name: &str, text: &str) -> MaterialDescriptor {
        MaterialDescriptor {
            path: PathBuf::from(format!("uploads/{name}")),
            name: name.to_string(),
            size: text.len() as u64,
            kind: MaterialKind::Pdf,
            extraction: Some(Extraction::Text(text.to_string())),
        }
    }

    const CHAT: BudgetPolicy = BudgetPolicy {
        per_item_cap: 2500,
        total_cap: 10_000,
        final_cap: 12_000,
    };

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exactly", 7), "exactly");
        assert_eq!(truncate_chars("abcdef", 3), format!("abc{TRUNCATION_MARKER}"));
        assert_eq!(truncate_chars("abc", 0), TRUNCATION_MARKER);
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("नमस्ते दोस्त", 6), format!("नमस्ते{TRUNCATION_MARKER}"));
        assert_eq!(truncate_chars("🔥🔥🔥", 2), format!("🔥🔥{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_flat_cap_when_under_total() {
        assert_eq!(CHAT.allotments(&[3000, 100, 2500]), vec![2500, 100, 2500]);
    }

    #[test]
    fn test_proportional_when_over_total() {
        // Total 12_000 > 10_000: every item shrinks, even the small one.
        assert_eq!(CHAT.allotments(&[9000, 1000, 2000]), vec![7500, 833, 1666]);
    }

    #[test]
    fn test_allotments_empty_and_zero_lengths() {
        assert!(CHAT.allotments(&[]).is_empty());
        assert_eq!(CHAT.allotments(&[0, 0]), vec![0, 0]);
    }

    #[test]
    fn test_apply_headers_and_flat_truncation() {
        let policy = BudgetPolicy {
            per_item_cap: 5,
            total_cap: 100,
            final_cap: 1000,
        };
        let out = policy.apply(&[material("a.pdf", "0123456789"), material("b.png", "xy")]);
        assert_eq!(
            out,
            format!("--- a.pdf ---\n01234{TRUNCATION_MARKER}\n\n--- b.png ---\nxy\n\n")
        );
    }

    #[test]
    fn test_apply_unnamed_and_missing_extraction() {
        let unnamed = material("", "text");
        let mut pending = material("later.pdf", "");
        pending.extraction = None;
        let out = CHAT.apply(&[unnamed, pending]);
        assert_eq!(out, "--- Unnamed material ---\ntext\n\n--- later.pdf ---\n\n\n");
    }

    #[test]
    fn test_apply_failed_extraction_contributes_placeholder() {
        let mut broken = material("scan.png", "");
        broken.extraction = Some(Extraction::Failed {
            reason: "OCR is disabled".into(),
        });
        let out = CHAT.apply(&[broken]);
        assert!(out.contains("[Error extracting text: OCR is disabled]"));
    }

    #[test]
    fn test_final_cap_bounds_output() {
        let policy = BudgetPolicy {
            per_item_cap: 2000,
            total_cap: 8000,
            final_cap: 100,
        };
        let out = policy.apply(&[material("a.pdf", &"x".repeat(500))]);
        assert_eq!(out.chars().count(), 100);
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_final_cap_smaller_than_marker() {
        assert_eq!(cap_total("abcdefgh".into(), 3), "abc");
    }

    #[test]
    fn test_apply_empty_materials() {
        assert_eq!(CHAT.apply(&[]), "");
    }
}
