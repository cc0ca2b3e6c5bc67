//! Pulls the actual question out of an inbound email body.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};

/// Fallback excerpt length when the body has no explicit question.
pub const MAX_QUESTION_CHARS: usize = 200;

const MIN_LINE_CHARS: usize = 4;
const MIN_QUESTION_CHARS: usize = 6;

/// Quoted replies, forwarded headers and mailer boilerplate.
static NOISE_PATTERN: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^>",
        r"(?i)^on\b.*\bwrote:\s*$",
        r"(?i)^(from|to|cc|subject|date|sent):",
        r"(?i)\bsent (from|via)\b",
        r"(?i)(unsubscribe|view in browser|privacy policy)",
    ])
    .expect("fail to create the email noise patterns")
});

/// Matched against the lowercased line; everything after it is dropped.
static SIGNATURE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(--\s*|_{3,}|-{3,}\s*original message\s*-{3,})$")
        .expect("fail to create the signature separator pattern")
});

/// Cleans `body` and returns the first sentence ending in `?`, or the cleaned
/// text cut to [`MAX_QUESTION_CHARS`]. `None` when nothing meaningful is left.
pub fn extract_question(body: &str) -> Option<String> {
    let mut kept = Vec::new();
    for line in body.lines().map(str::trim) {
        let lowered = line.to_ascii_lowercase();
        if SIGNATURE_PATTERN.is_match(&lowered) {
            break;
        }
        if line.chars().count() < MIN_LINE_CHARS || NOISE_PATTERN.is_match(line) {
            continue;
        }
        kept.push(line);
    }

    let text = kept.join(" ").split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }

    if let Some(question) = sentences(&text)
        .into_iter()
        .find(|sentence| sentence.ends_with('?') && sentence.chars().count() >= MIN_QUESTION_CHARS)
    {
        return Some(question.to_string());
    }

    Some(text.chars().take(MAX_QUESTION_CHARS).collect::<String>().trim_end().to_string())
}

/// Splits on `.`, `!` and `?` followed by whitespace or end of text, keeping
/// the terminator. Decimal points stay inside their sentence.
fn sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if at_boundary {
            let end = index + ch.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::{extract_question, sentences, MAX_QUESTION_CHARS, NOISE_PATTERN, SIGNATURE_PATTERN};

    #[test]
    fn filter_patterns_compile_and_match() {
        assert_eq!(NOISE_PATTERN.len(), 5);
        assert!(NOISE_PATTERN.is_match("> quoted reply"));
        assert!(NOISE_PATTERN.is_match("On Tue, Dana wrote:"));
        assert!(NOISE_PATTERN.is_match("Sent from my phone"));
        assert!(!NOISE_PATTERN.is_match("What were sales in the north?"));

        assert!(SIGNATURE_PATTERN.is_match("--"));
        assert!(SIGNATURE_PATTERN.is_match("----- original message -----"));
        assert!(!SIGNATURE_PATTERN.is_match("-- not a separator"));
    }

    #[test]
    fn picks_first_question_sentence() {
        let body = "Hi team,\n\nHope all is well. What were the total sales in the north region? \
                    Also the users.\n\nThanks,\nDana";
        assert_eq!(
            extract_question(body).as_deref(),
            Some("What were the total sales in the north region?")
        );
    }

    #[test]
    fn drops_quoted_reply_and_headers() {
        let body = "How many users do we have?\n\n\
                    On Tue, Mar 4, 2025 at 9:12 AM Alex <alex@example.com> wrote:\n\
                    > What is the weather like?\n\
                    > Another quoted line?";
        assert_eq!(extract_question(body).as_deref(), Some("How many users do we have?"));
    }

    #[test]
    fn stops_at_signature_and_ignores_mobile_footer() {
        let body = "Please send the profit and loss for Q2\nSent from my phone\n--\nIs this a question?";
        assert_eq!(
            extract_question(body).as_deref(),
            Some("Please send the profit and loss for Q2")
        );
    }

    #[test]
    fn falls_back_to_capped_text() {
        let body = "report ".repeat(100);
        let extracted = extract_question(&body).expect("text");
        assert!(extracted.chars().count() <= MAX_QUESTION_CHARS);
        assert!(extracted.starts_with("report report"));
    }

    #[test]
    fn empty_or_noise_only_body_has_no_question() {
        assert_eq!(extract_question(""), None);
        assert_eq!(extract_question("> quoted only\n\nok\n"), None);
    }

    #[test]
    fn decimal_points_do_not_split_sentences() {
        assert_eq!(
            sentences("Is growth above 3.5 percent? Yes."),
            vec!["Is growth above 3.5 percent?", "Yes."]
        );
    }
}
