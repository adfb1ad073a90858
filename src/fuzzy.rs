//! Token-level fuzzy similarity

/// Score how well `pattern` matches `text`, from 0.0 to 1.0.
///
/// Both strings are lowercased and split into whitespace tokens. The token
/// list of whichever input is longer (in characters, before lowercasing) is
/// walked; each of its tokens takes the best score against the other list:
/// 1.0 for the first exact match, otherwise the share of the longer token
/// covered by the shorter one when it is a substring. The result is the mean
/// over the longer list.
pub fn similarity(pattern: &str, text: &str) -> f64 {
    if pattern.is_empty() || text.is_empty() {
        return 0.0;
    }

    let pattern_lower = pattern.to_lowercase();
    let text_lower = text.to_lowercase();

    let (long, short) = if text.chars().count() > pattern.chars().count() {
        (&text_lower, &pattern_lower)
    } else {
        (&pattern_lower, &text_lower)
    };

    let long_tokens: Vec<&str> = long.split_whitespace().collect();
    let short_tokens: Vec<&str> = short.split_whitespace().collect();
    if long_tokens.is_empty() || short_tokens.is_empty() {
        return 0.0;
    }

    let total: f64 = long_tokens
        .iter()
        .map(|token| best_token_score(token, &short_tokens))
        .sum();

    total / long_tokens.len() as f64
}

fn best_token_score(token: &str, candidates: &[&str]) -> f64 {
    let mut best = 0.0;
    for candidate in candidates {
        if token == *candidate {
            return 1.0;
        }
        let (shorter, longer) = if token.len() > candidate.len() {
            (*candidate, token)
        } else {
            (token, *candidate)
        };
        if !longer.contains(shorter) {
            continue;
        }
        let remaining = longer.replace(shorter, "").chars().count() as f64;
        let score = 1.0 - remaining / longer.chars().count() as f64;
        if score > best {
            best = score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings() {
        assert_eq!(similarity("genre", "genre"), 1.0);
        assert_eq!(similarity("Read More", "read more"), 1.0);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("", "abc"), 0.0);
        assert_eq!(similarity("   ", "abc"), 0.0);
    }

    #[test]
    fn test_token_order_is_ignored() {
        assert_eq!(similarity("a b c", "c b a"), 1.0);
    }

    #[test]
    fn test_substring_score() {
        // "png" covers 3 of the 5 characters of "x.png"
        let score = similarity("png", "x.png");
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_longer_input_drives_the_mean() {
        // Long side is the text: "genres" scores 1 - 1/6, "list" scores 0
        let score = similarity("genre", "genres list");
        assert!((score - (5.0 / 6.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_exact_match_beats_substring() {
        // "tag" meets "tags" (substring) before "tag" (exact); exact still scores 1
        assert_eq!(similarity("tag tags", "tags tag"), 1.0);
    }

    #[test]
    fn test_unrelated_tokens() {
        assert_eq!(similarity("img", "png"), 0.0);
        assert!(similarity("description", "chapter list") <= 0.5);
    }
}
