//! Quotation post-filter.
//!
//! Generated text is split on blank lines; a segment is kept iff it opens
//! with a double quote and closes with the literal attribution suffix
//! `" - <author>`. Matching is exact: no trimming, no case folding.

/// Attribution used when none is configured.
pub const DEFAULT_AUTHOR: &str = "Alan Watts";

/// Return the segments of `text` that look like attributed quotes,
/// in order of appearance. An empty result is not an error.
pub fn find_quotes<'a>(text: &'a str, author: &str) -> Vec<&'a str> {
    let suffix = format!("\" - {author}");
    text.split("\n\n")
        .filter(|segment| segment.starts_with('"') && segment.ends_with(&suffix))
        .collect()
}
