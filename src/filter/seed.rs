//! Seed resolver: initial selection from the page's query state
//!
//! The routing layer that owns location state is an external collaborator;
//! it hands over the raw query string once at mount. The seed is the
//! multi-valued `matched_rules` parameter, read exactly once and reconciled
//! against the first successful registry load.

/// Query parameter carrying previously selected rule identifiers
pub const SEED_PARAM: &str = "matched_rules";

/// Extract the seed rule identifiers from a query string
///
/// Accepts the query with or without a leading `?`. Values are
/// percent-decoded; empty values and unrelated parameters are ignored.
pub fn seed_from_query(query: &str) -> Vec<String> {
    let query = query.strip_prefix('?').unwrap_or(query);

    let mut ids = Vec::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if percent_decode(key) == SEED_PARAM && !value.is_empty() {
            ids.push(percent_decode(value));
        }
    }
    ids
}

/// Minimal application/x-www-form-urlencoded decoding (`%XX` and `+`)
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                match (
                    bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                    bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
                ) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                    }
                    // Malformed escape: keep the '%' as-is
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_valued_parameter() {
        let ids = seed_from_query("matched_rules=r1&matched_rules=r3");
        assert_eq!(ids, vec!["r1", "r3"]);
    }

    #[test]
    fn test_leading_question_mark_and_other_params() {
        let ids = seed_from_query("?service=http&matched_rules=r1&limit=50");
        assert_eq!(ids, vec!["r1"]);
    }

    #[test]
    fn test_missing_parameter_is_empty_seed() {
        assert!(seed_from_query("").is_empty());
        assert!(seed_from_query("?service=http").is_empty());
        assert!(seed_from_query("matched_rules=").is_empty());
    }

    #[test]
    fn test_percent_decoded_values() {
        let ids = seed_from_query("matched_rules=5f%2Dab%2001");
        assert_eq!(ids, vec!["5f-ab 01"]);

        let ids = seed_from_query("matched_rules=a+b");
        assert_eq!(ids, vec!["a b"]);
    }

    #[test]
    fn test_malformed_escape_kept_verbatim() {
        let ids = seed_from_query("matched_rules=r%zz1");
        assert_eq!(ids, vec!["r%zz1"]);
    }
}
