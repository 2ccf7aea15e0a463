use std::sync::LazyLock;

use regex::Regex;

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_-]+)").expect("valid mention regex"));

/// Extract `@name` mentions from a message body, de-duplicated in first-seen order.
pub fn extract_mentions(body: &str) -> Vec<String> {
    let mut mentions: Vec<String> = Vec::new();
    for caps in MENTION.captures_iter(body) {
        let name = &caps[1];
        if !mentions.iter().any(|m| m == name) {
            mentions.push(name.to_string());
        }
    }
    mentions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_in_first_seen_order() {
        assert_eq!(
            extract_mentions("@carol ping @bob, cc @carol"),
            vec!["carol", "bob"]
        );
    }

    #[test]
    fn accepts_hyphen_and_underscore() {
        assert_eq!(
            extract_mentions("hey @build-bot and @test_runner_2"),
            vec!["build-bot", "test_runner_2"]
        );
    }

    #[test]
    fn bare_at_yields_nothing() {
        assert!(extract_mentions("email me @ noon").is_empty());
        assert!(extract_mentions("@").is_empty());
        assert!(extract_mentions("@!bob").is_empty());
    }

    #[test]
    fn stops_at_punctuation() {
        assert_eq!(extract_mentions("(@bob)."), vec!["bob"]);
        assert_eq!(extract_mentions("@alice:done"), vec!["alice"]);
    }

    #[test]
    fn email_addresses_still_match_domain_part() {
        // No word-boundary rule: anything after '@' counts.
        assert_eq!(extract_mentions("x@example.com"), vec!["example"]);
    }
}
