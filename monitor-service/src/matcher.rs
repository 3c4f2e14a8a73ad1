use sociwave_core::Rule;

/// A keyword list consisting of only this entry matches every comment.
pub const MATCH_EVERYTHING: &str = ".";

/// Keyword test for one comment against one rule.
///
/// An empty keyword list, or the single `"."` entry, matches any text
/// including the empty string. Otherwise a comment matches when any keyword
/// appears in it, ignoring case.
pub fn matches(rule: &Rule, text: &str) -> bool {
    matches_words(&rule.match_words, text)
}

pub fn matches_words(words: &[String], text: &str) -> bool {
    match words {
        [] => true,
        [only] if only == MATCH_EVERYTHING => true,
        _ => {
            let haystack = text.to_lowercase();
            words
                .iter()
                .any(|word| haystack.contains(&word.to_lowercase()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(words: &[&str]) -> Rule {
        Rule::new("r1", "Thanks!").with_match_words(words.iter().copied())
    }

    #[test]
    fn test_match_everything() {
        for text in ["", "anything at all", "ÜBER"] {
            assert!(matches(&rule(&[]), text));
            assert!(matches(&rule(&["."]), text));
        }
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let rule = rule(&["Hi", "buy"]);
        assert!(matches(&rule, "hi there, want to BUY?"));
        assert!(matches(&rule, "I'd buy"));
        assert!(!matches(&rule, "hello"));
        assert!(!matches(&rule, ""));
    }

    #[test]
    fn test_dot_among_other_words_is_literal() {
        let rule = rule(&[".", "price"]);
        assert!(matches(&rule, "the price?"));
        assert!(matches(&rule, "end."));
        assert!(!matches(&rule, "no punctuation"));
    }

    #[test]
    fn test_unicode_lowercase() {
        let rule = rule(&["ÇA"]);
        assert!(matches(&rule, "ça marche"));
    }
}
