//! Structured mention parsing for Discord message text.
//!
//! Mentions are removed by dropping parsed tokens, never by substring
//! replacement, so `<@12>` can never eat part of `<@123>`.

use regex::Regex;
use std::sync::LazyLock;

static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@(!|&)?(\d+)>").expect("hardcoded regex"));

/// One span of message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    /// `<@id>` or the legacy nickname form `<@!id>`.
    User(u64),
    /// `<@&id>`.
    Role(u64),
}

/// Split message text into plain text and mention tokens.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut cursor = 0;

    for captures in MENTION_PATTERN.captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        // Ids too large for u64 are not real snowflakes; leave them as text.
        let Some(id) = captures
            .get(2)
            .and_then(|id| id.as_str().parse::<u64>().ok())
        else {
            continue;
        };

        if whole.start() > cursor {
            tokens.push(Token::Text(&text[cursor..whole.start()]));
        }
        let is_role = captures.get(1).is_some_and(|sigil| sigil.as_str() == "&");
        tokens.push(if is_role { Token::Role(id) } else { Token::User(id) });
        cursor = whole.end();
    }

    if cursor < text.len() {
        tokens.push(Token::Text(&text[cursor..]));
    }

    tokens
}

/// Remove the mention tokens the platform reported as structured mentions and
/// trim surrounding whitespace.
pub fn strip_mentions(text: &str, user_mentions: &[u64], role_mentions: &[u64]) -> String {
    let mut cleaned = String::with_capacity(text.len());

    for token in tokenize(text) {
        match token {
            Token::Text(span) => cleaned.push_str(span),
            Token::User(id) if user_mentions.contains(&id) => {}
            Token::Role(id) if role_mentions.contains(&id) => {}
            Token::User(id) => cleaned.push_str(&format!("<@{id}>")),
            Token::Role(id) => cleaned.push_str(&format!("<@&{id}>")),
        }
    }

    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_all_mention_forms() {
        let tokens = tokenize("hi <@1> and <@!2>, ping <@&3>!");
        assert_eq!(
            tokens,
            vec![
                Token::Text("hi "),
                Token::User(1),
                Token::Text(" and "),
                Token::User(2),
                Token::Text(", ping "),
                Token::Role(3),
                Token::Text("!"),
            ]
        );
    }

    #[test]
    fn strips_reported_mentions_and_trims() {
        let cleaned = strip_mentions("<@100> what is <@&7> doing? ", &[100], &[7]);
        assert_eq!(cleaned, "what is  doing?");
    }

    #[test]
    fn nickname_form_is_stripped() {
        assert_eq!(strip_mentions("<@!100>   hello", &[100], &[]), "hello");
    }

    #[test]
    fn no_partial_matches_between_ids() {
        let cleaned = strip_mentions("<@12> <@123> hey", &[12], &[]);
        assert_eq!(cleaned, "<@123> hey");
    }

    #[test]
    fn unreported_mentions_are_kept() {
        assert_eq!(strip_mentions("<@5> <@6> yo", &[5], &[]), "<@6> yo");
    }

    #[test]
    fn text_without_mentions_is_only_trimmed() {
        assert_eq!(strip_mentions("  plain text\n", &[], &[]), "plain text");
        assert_eq!(strip_mentions("<@1>", &[1], &[]), "");
    }

    #[test]
    fn oversized_ids_stay_text() {
        let text = "<@99999999999999999999999> hi";
        assert_eq!(tokenize(text), vec![Token::Text(text)]);
    }
}
