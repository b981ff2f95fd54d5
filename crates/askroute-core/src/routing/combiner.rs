//! Merges partial graph and lexical answers when no strategy answered outright

use serde::{Deserialize, Serialize};

/// Returned when there is nothing to say
pub const NO_ANSWER: &str = "No answer found.";

/// Heading placed before supplementary lexical text
pub const ADDITIONAL_CONTEXT_LABEL: &str = "(Additional context)";

const ARTICLES: &[&str] = &["a", "an", "the"];

/// Final answer text after combining
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combined {
    pub answer: String,
    /// False only when the answer is the sentinel
    pub had_answer: bool,
}

/// Lower-cased words without punctuation or articles, single-space separated
fn comparable(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !ARTICLES.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `supplement` adds nothing to `primary`
fn already_covered(primary: &str, supplement: &str) -> bool {
    let supplement = comparable(supplement);
    if supplement.is_empty() {
        return true;
    }
    format!(" {} ", comparable(primary)).contains(&format!(" {} ", supplement))
}

/// Prefer the graph answer; append lexical text it does not already contain
pub fn combine(graph: Option<&str>, lexical: Option<&str>) -> Combined {
    let graph = graph.map(str::trim).filter(|s| !s.is_empty());
    let lexical = lexical.map(str::trim).filter(|s| !s.is_empty());

    let answer = match (graph, lexical) {
        (Some(g), Some(l)) if !already_covered(g, l) => {
            format!("{}\n\n{}\n{}", g, ADDITIONAL_CONTEXT_LABEL, l)
        }
        (Some(g), _) => g.to_string(),
        (None, Some(l)) => l.to_string(),
        (None, None) => {
            return Combined {
                answer: NO_ANSWER.to_string(),
                had_answer: false,
            };
        }
    };

    Combined {
        answer,
        had_answer: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contained_lexical_is_dropped() {
        let combined = combine(Some("X is the CEO of Y."), Some("X is CEO of Y."));
        assert_eq!(combined.answer, "X is the CEO of Y.");
        assert!(combined.had_answer);

        let same = combine(Some("Elon Musk is the CEO of Tesla."), Some("elon musk"));
        assert_eq!(same.answer, "Elon Musk is the CEO of Tesla.");
    }

    #[test]
    fn test_new_lexical_is_appended() {
        let combined = combine(Some("X is CEO of Y."), Some("Y reported record profits."));
        assert_eq!(
            combined.answer,
            "X is CEO of Y.\n\n(Additional context)\nY reported record profits."
        );
    }

    #[test]
    fn test_partial_words_are_not_containment() {
        // "ten" appears inside "tense" but not as a word
        let combined = combine(Some("The market is tense."), Some("ten"));
        assert!(combined.answer.contains(ADDITIONAL_CONTEXT_LABEL));
    }

    #[test]
    fn test_single_side() {
        assert_eq!(combine(None, Some("  only lexical  ")).answer, "only lexical");
        assert_eq!(combine(Some("only graph"), Some("   ")).answer, "only graph");
    }

    #[test]
    fn test_nothing_gives_sentinel() {
        let combined = combine(None, Some(""));
        assert_eq!(combined.answer, NO_ANSWER);
        assert!(!combined.had_answer);
    }
}
