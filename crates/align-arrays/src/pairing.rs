//! Which sessions get aligned against each other.

use align_core::models::TrialTable;
use tracing::debug;

/// Rules excluding session pairs from cross-subject alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRules {
    /// Pairs whose subjects *both* contain one of these markers are skipped.
    pub shared_markers: Vec<String>,
}

impl Default for PairingRules {
    fn default() -> Self {
        Self {
            shared_markers: vec!["Chewie".to_string()],
        }
    }
}

impl PairingRules {
    fn excludes(&self, a: &str, b: &str) -> bool {
        a == b
            || self
                .shared_markers
                .iter()
                .any(|m| a.contains(m.as_str()) && b.contains(m.as_str()))
    }
}

/// Index pairs `(i, j)` with `i < j` of sessions from different subjects,
/// in nested-loop order.
pub fn paired_sessions<S: AsRef<str>>(subjects: &[S], rules: &PairingRules) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (i, a) in subjects.iter().enumerate() {
        for (j, b) in subjects.iter().enumerate().skip(i + 1) {
            if rules.excludes(a.as_ref(), b.as_ref()) {
                continue;
            }
            pairs.push((i, j));
        }
    }
    debug!("{} pairs from {} sessions", pairs.len(), subjects.len());
    pairs
}

/// [`paired_sessions`] over the subjects of loaded tables.
pub fn paired_tables(tables: &[TrialTable], rules: &PairingRules) -> Vec<(usize, usize)> {
    let subjects: Vec<&str> = tables.iter().map(|t| t.subject.as_str()).collect();
    paired_sessions(&subjects, rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_cross_subject_pairs_in_loop_order() {
        let subjects = ["Chewie", "Mihili", "Chewie", "Jaco"];
        let pairs = paired_sessions(&subjects, &PairingRules::default());
        assert_eq!(pairs, vec![(0, 1), (0, 3), (1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn test_shared_marker_skips_related_subjects() {
        let subjects = ["Chewie", "Chewie2", "Mihili"];
        let pairs = paired_sessions(&subjects, &PairingRules::default());
        assert_eq!(pairs, vec![(0, 2), (1, 2)]);

        let no_markers = PairingRules {
            shared_markers: Vec::new(),
        };
        assert_eq!(
            paired_sessions(&subjects, &no_markers),
            vec![(0, 1), (0, 2), (1, 2)]
        );
    }

    #[test]
    fn test_pairs_have_no_self_duplicate_or_same_subject() {
        let subjects = ["A", "B", "A", "C", "B", "D", "C"];
        let pairs = paired_sessions(&subjects, &PairingRules::default());
        let unique: HashSet<_> = pairs.iter().collect();
        assert_eq!(unique.len(), pairs.len());
        for &(i, j) in &pairs {
            assert!(i < j);
            assert_ne!(subjects[i], subjects[j]);
        }
    }

    #[test]
    fn test_empty_and_single() {
        let none: [&str; 0] = [];
        assert!(paired_sessions(&none, &PairingRules::default()).is_empty());
        assert!(paired_sessions(&["Jaco"], &PairingRules::default()).is_empty());
    }

    #[test]
    fn test_paired_tables_uses_subjects() {
        let table = |subject: &str| TrialTable::new(subject, format!("{}_1", subject), Vec::new()).unwrap();
        let tables = vec![table("Mihili"), table("Chewie"), table("Mihili")];
        assert_eq!(
            paired_tables(&tables, &PairingRules::default()),
            vec![(0, 1), (1, 2)]
        );
    }
}
