use similar::{ChangeTag, TextDiff};

const ORIGINAL_HEADER: &str = "Original XML";
const ALTERED_HEADER: &str = "Altered XML";

/// Line counts for one XML diff.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffStats {
    pub lines_added: usize,
    pub lines_removed: usize,
}

impl DiffStats {
    pub fn is_empty(&self) -> bool {
        self.lines_added == 0 && self.lines_removed == 0
    }
}

/// Unified diff between two serialized documents.
///
/// Returns an empty string when the documents are identical.
pub fn xml_diff(original: &str, altered: &str) -> (String, DiffStats) {
    let diff = TextDiff::from_lines(original, altered);

    let mut stats = DiffStats::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stats.lines_added += 1,
            ChangeTag::Delete => stats.lines_removed += 1,
            ChangeTag::Equal => {}
        }
    }
    if stats.is_empty() {
        return (String::new(), stats);
    }

    let unified = diff
        .unified_diff()
        .context_radius(3)
        .header(ORIGINAL_HEADER, ALTERED_HEADER)
        .to_string();
    (unified, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_documents_have_no_diff() {
        let xml = "<domain>\n  <name>a</name>\n</domain>\n";
        let (diff, stats) = xml_diff(xml, xml);
        assert_eq!(diff, "");
        assert!(stats.is_empty());
    }

    #[test]
    fn changed_line_is_reported() {
        let before = "<domain>\n  <name>a</name>\n  <vcpu>1</vcpu>\n</domain>\n";
        let after = "<domain>\n  <name>a</name>\n  <vcpu>4</vcpu>\n</domain>\n";
        let (diff, stats) = xml_diff(before, after);
        assert!(diff.starts_with("--- Original XML\n+++ Altered XML\n"));
        assert!(diff.contains("-  <vcpu>1</vcpu>"));
        assert!(diff.contains("+  <vcpu>4</vcpu>"));
        assert_eq!(stats, DiffStats { lines_added: 1, lines_removed: 1 });
    }
}
