use regex::{Regex, RegexBuilder};

/// True when every term occurs in `text`, ignoring case. Terms are regular
/// expressions; a term that is not a valid pattern is matched literally.
pub fn matches(text: &str, required_terms: &[String]) -> bool {
    for term in required_terms {
        if !term_pattern(term).is_some_and(|re| re.is_match(text)) {
            tracing::debug!(term = %term, "Keyword missing from description");
            return false;
        }
    }
    tracing::debug!(terms = ?required_terms, "All keywords present");
    true
}

fn term_pattern(term: &str) -> Option<Regex> {
    let build = |pattern: &str| RegexBuilder::new(pattern).case_insensitive(true).build();
    build(term).or_else(|_| build(&regex::escape(term))).ok()
}
