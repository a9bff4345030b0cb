//! Prompt templates and reply parsing.
//!
//! Three prompts are sent to the chat model per alert-enabled query:
//!
//! | Prompt | Builder | Reply parser |
//! |--------|---------|--------------|
//! | Alert intent detection | [`intent_prompt`] | [`parse_intent_reply`] |
//! | Answer generation | [`answer_prompt`] | raw text |
//! | Semantic deviation check | [`compare_prompt`] | [`is_affirmative`] |
//!
//! Parsing never fails: a reply that does not have the expected `Yes`/`No`
//! shape degrades to the documented default (no alerting, not deviating).

/// Literal marker appended to the caller's result when alerting is enabled.
pub const ALERT_SUFFIX: &str = "\n\n🔔 Activated";

/// Characters stripped from both ends of the model's restated query.
const QUERY_TRIM: &[char] = &['.', '"', '\''];

/// Ask the model whether `query` requests alerts, and to restate it without
/// the alerting phrase.
pub fn intent_prompt(query: &str) -> String {
    format!(
        r#"Evaluate the user's query and identify if there is a request for notifications on answer alterations:
    User Query: '{query}'

    Respond with 'Yes' if there is a request for alerts, and 'No' if not,
    followed by the query without the alerting request part.

    Examples:
    "Tell me about windows in Pathway" => "No. Tell me about windows in Pathway"
    "Tell me and alert about windows in Pathway" => "Yes. Tell me about windows in Pathway"
    "#
    )
}

/// Parsed reply to an [`intent_prompt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentReply {
    pub alert_enabled: bool,
    pub clean_query: String,
    /// `false` when the reply did not start with `Yes` or `No` and the
    /// fallback was applied.
    pub recognized: bool,
}

/// Split an intent reply into `(alert_enabled, clean_query)`.
///
/// Leading whitespace and quotes are skipped, then the first three
/// characters decide: they contain `yes` (any case) → alerting; they start
/// with `no` → no alerting. The rest of the reply, trimmed of whitespace,
/// quotes and periods, is the clean query.
///
/// Anything else is unrecognized: alerting is off and the whole trimmed
/// reply is used as the query. If the resulting query is empty the raw
/// query is used instead.
///
/// Two departures from a literal "first three characters" reading:
/// models often wrap the whole reply in quotes, so `"Yes. ..."` counts as
/// yes; and an unrecognized reply keeps all of its text rather than
/// dropping three characters that were never a Yes/No prefix.
pub fn parse_intent_reply(reply: &str, raw_query: &str) -> IntentReply {
    let body = reply.trim_start_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'');
    let head: String = body.chars().take(3).collect::<String>().to_lowercase();
    let rest: String = body.chars().skip(3).collect();

    let (alert_enabled, recognized, candidate) = if head.contains("yes") {
        (true, true, rest)
    } else if head.starts_with("no") {
        (false, true, rest)
    } else {
        (false, false, body.to_string())
    };

    let mut clean_query = trim_query(&candidate).to_string();
    if clean_query.is_empty() {
        clean_query = trim_query(raw_query).to_string();
    }

    IntentReply {
        alert_enabled,
        clean_query,
        recognized,
    }
}

fn trim_query(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || QUERY_TRIM.contains(&c))
}

/// Build the answer prompt: context documents, newline-joined, then the query.
pub fn answer_prompt<S: AsRef<str>>(documents: &[S], query: &str) -> String {
    let docs = documents
        .iter()
        .map(|d| d.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Please process the documents below:\n{docs}\n\nRespond to query: '{query}'\n"
    )
}

/// Ask the model whether a new response deviates from the previous one.
pub fn compare_prompt(new: &str, old: &str) -> String {
    format!(
        r#"
    Are the two following responses deviating?
    Answer with Yes or No.

    First response: "{old}"

    Second response: "{new}"
    "#
    )
}

/// `true` when a yes/no decision reply says yes.
pub fn is_affirmative(decision: &str) -> bool {
    decision.to_lowercase().contains("yes")
}

/// The text delivered to the alert channel for an accepted response.
pub fn notification_message(query: &str, response: &str) -> String {
    format!("New response for question \"{query}\":\n{response}")
}

/// The text returned to the caller.
pub fn format_result(response: &str, alert_enabled: bool) -> String {
    if alert_enabled {
        format!("{response}{ALERT_SUFFIX}")
    } else {
        response.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_yes() {
        let r = parse_intent_reply("Yes. Tell me about windows", "Tell me and alert about windows");
        assert!(r.alert_enabled);
        assert!(r.recognized);
        assert_eq!(r.clean_query, "Tell me about windows");
    }

    #[test]
    fn test_intent_no() {
        let r = parse_intent_reply("No. Tell me about windows in Pathway", "x");
        assert!(!r.alert_enabled);
        assert_eq!(r.clean_query, "Tell me about windows in Pathway");
    }

    #[test]
    fn test_intent_case_and_quotes() {
        let r = parse_intent_reply("\"YES. Tell me about windows.\"", "raw");
        assert!(r.alert_enabled);
        assert_eq!(r.clean_query, "Tell me about windows");
    }

    #[test]
    fn test_intent_unrecognized_falls_back() {
        let r = parse_intent_reply("  Tell me about windows  ", "Tell me about windows?");
        assert!(!r.alert_enabled);
        assert!(!r.recognized);
        assert_eq!(r.clean_query, "Tell me about windows");
    }

    #[test]
    fn test_intent_empty_remainder_uses_raw_query() {
        let r = parse_intent_reply("Yes.", "Alert me about the weather.");
        assert!(r.alert_enabled);
        assert_eq!(r.clean_query, "Alert me about the weather");
    }

    #[test]
    fn test_intent_multibyte_safe() {
        let r = parse_intent_reply("Oui, été", "q");
        assert!(!r.alert_enabled);
        assert_eq!(r.clean_query, "Oui, été");
    }

    #[test]
    fn test_answer_prompt_layout() {
        let docs = vec!["cats are mammals", "dogs are mammals"];
        let prompt = answer_prompt(&docs, "Tell me about mammals");
        assert!(prompt.contains("cats are mammals\ndogs are mammals"));
        let docs_at = prompt.find("dogs are mammals").unwrap();
        let query_at = prompt.find("Tell me about mammals").unwrap();
        assert!(docs_at < query_at);
    }

    #[test]
    fn test_compare_prompt_contains_both() {
        let p = compare_prompt("new text", "old text");
        assert!(p.find("old text").unwrap() < p.find("new text").unwrap());
    }

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("Yes."));
        assert!(is_affirmative("yes, they deviate"));
        assert!(!is_affirmative("No."));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn test_format_result() {
        assert_eq!(format_result("answer", false), "answer");
        assert_eq!(format_result("answer", true), "answer\n\n🔔 Activated");
    }

    #[test]
    fn test_notification_message() {
        assert_eq!(
            notification_message("q", "r"),
            "New response for question \"q\":\nr"
        );
    }
}
