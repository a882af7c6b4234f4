//! ---
//! mb_section: "02-messaging-data-model"
//! mb_subsection: "module"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Message records, pattern matching, and buffering."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
//! Topic filter matching.
//!
//! Filters use the conventional pub/sub wildcards: `+` matches exactly one
//! level, `#` matches any number of trailing levels (including zero). The
//! same filters drive both subscriptions and buffer queries.

/// Returns true when `topic` matches the given `filter`.
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(level), Some(name)) if level == name => {}
            (None, None) => return true,
            // A trailing "/#" also matches the parent level itself.
            _ => return false,
        }
    }
}

/// Validate a topic filter: `#` only as the final level, wildcards only as
/// whole levels.
pub fn validate(filter: &str) -> Result<(), String> {
    if filter.is_empty() {
        return Err("filter cannot be empty".to_owned());
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') {
            if *level != "#" {
                return Err(format!("'#' must occupy a whole level in {filter}"));
            }
            if index != levels.len() - 1 {
                return Err(format!("'#' is only allowed as the final level in {filter}"));
            }
        }
        if level.contains('+') && *level != "+" {
            return Err(format!("'+' must occupy a whole level in {filter}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_topics_match_themselves() {
        assert!(matches("bench/floor1/temp", "bench/floor1/temp"));
        assert!(!matches("bench/floor1/temp", "bench/floor1/humidity"));
    }

    #[test]
    fn single_level_wildcard_matches_one_level() {
        assert!(matches("bench/+/temp", "bench/floor1/temp"));
        assert!(matches("bench/+/temp", "bench/floor2/temp"));
        assert!(!matches("bench/+/temp", "bench/floor1/attic/temp"));
        assert!(!matches("bench/+", "bench"));
    }

    #[test]
    fn multi_level_wildcard_matches_trailing_levels() {
        assert!(matches("/testcase/1/#", "/testcase/1/step2"));
        assert!(matches("/testcase/1/#", "/testcase/1/a/b/c"));
        assert!(matches("#", "anything/at/all"));
        assert!(!matches("/testcase/1/#", "/testcase/2/step1"));
    }

    #[test]
    fn hash_matches_the_parent_level() {
        assert!(matches("bench/#", "bench"));
    }

    #[test]
    fn validation_rejects_embedded_wildcards() {
        assert!(validate("bench/+/temp").is_ok());
        assert!(validate("bench/#").is_ok());
        assert!(validate("bench/fl+oor").is_err());
        assert!(validate("bench/#/temp").is_err());
        assert!(validate("").is_err());
    }
}
