//! Plain-text reply composed for an inbound email.

use mailfn_core::ExecutionResult;
use serde::Serialize;
use tera::{Context, Tera};

const REPLY_TEMPLATE_NAME: &str = "reply.txt";

const REPLY_TEMPLATE: &str = "\
Hello {{ recipient }},

You asked:
> {{ question }}

{% if ok %}Here is the answer:{% else %}We could not answer this request:{% endif %}

{{ answer }}

Reference: request #{{ record_id }}{% if function %} ({{ function }}){% endif %}

--
mailfn
";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComposedReply {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub struct ReplyRenderer {
    templates: Tera,
}

impl ReplyRenderer {
    pub fn new() -> Result<Self, tera::Error> {
        let mut templates = Tera::default();
        templates.add_raw_template(REPLY_TEMPLATE_NAME, REPLY_TEMPLATE)?;
        Ok(Self { templates })
    }

    pub fn render(
        &self,
        from: &str,
        subject: &str,
        question: &str,
        result: &ExecutionResult,
    ) -> Result<ComposedReply, tera::Error> {
        let mut context = Context::new();
        context.insert("recipient", &display_name(from));
        context.insert("question", question);
        context.insert("ok", &result.ok);
        context.insert("answer", &result.display_text);
        context.insert("record_id", &result.record_id);
        context.insert("function", &result.function_name);

        let body = self.templates.render(REPLY_TEMPLATE_NAME, &context)?;
        Ok(ComposedReply { to: reply_address(from), subject: reply_subject(subject), body })
    }
}

pub fn reply_subject(subject: &str) -> String {
    let subject = subject.trim();
    if subject.is_empty() {
        return "Re: your question".to_string();
    }
    if subject.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:")) {
        return subject.to_string();
    }
    format!("Re: {subject}")
}

/// `Dana Smith <dana@example.com>` -> `dana@example.com`.
pub fn reply_address(from: &str) -> String {
    match (from.find('<'), from.rfind('>')) {
        (Some(start), Some(end)) if end > start => from[start + 1..end].trim().to_string(),
        _ => from.trim().to_string(),
    }
}

/// Display name when present, else the mailbox part of the address.
fn display_name(from: &str) -> String {
    let name = from.split('<').next().unwrap_or_default().trim().trim_matches('"').trim();
    if !name.is_empty() && !name.contains('@') {
        return name.to_string();
    }
    let address = reply_address(from);
    match address.split('@').next() {
        Some(mailbox) if !mailbox.is_empty() => mailbox.to_string(),
        _ => "there".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use mailfn_core::{ExecutionOutcome, ExecutionResult};

    use super::{display_name, reply_address, reply_subject, ReplyRenderer};

    fn success() -> ExecutionResult {
        ExecutionResult {
            ok: true,
            outcome: ExecutionOutcome::Success,
            display_text: "125000".to_string(),
            function_name: Some("get_sales_total".to_string()),
            record_id: 7,
        }
    }

    #[test]
    fn renders_answer_with_reference() {
        let renderer = ReplyRenderer::new().expect("template");
        let reply = renderer
            .render(
                "Dana Smith <dana@example.com>",
                "Sales numbers",
                "What were sales in the north?",
                &success(),
            )
            .expect("render");

        assert_eq!(reply.to, "dana@example.com");
        assert_eq!(reply.subject, "Re: Sales numbers");
        assert!(reply.body.starts_with("Hello Dana Smith,"));
        assert!(reply.body.contains("> What were sales in the north?"));
        assert!(reply.body.contains("Here is the answer:\n\n125000"));
        assert!(reply.body.contains("Reference: request #7 (get_sales_total)"));
    }

    #[test]
    fn failed_request_uses_apology_heading() {
        let renderer = ReplyRenderer::new().expect("template");
        let result = ExecutionResult {
            ok: false,
            outcome: ExecutionOutcome::ResolutionFailed,
            display_text: "No available operation matches the request.".to_string(),
            function_name: None,
            record_id: 8,
        };

        let reply = renderer.render("ops@example.com", "", "Will it rain?", &result).expect("render");

        assert!(reply.body.starts_with("Hello ops,"));
        assert!(reply.body.contains("We could not answer this request:"));
        assert!(reply.body.contains("Reference: request #8\n"));
        assert_eq!(reply.subject, "Re: your question");
    }

    #[test]
    fn subject_is_not_double_prefixed() {
        assert_eq!(reply_subject("RE: numbers"), "RE: numbers");
        assert_eq!(reply_subject("numbers"), "Re: numbers");
    }

    #[test]
    fn address_and_name_parsing() {
        assert_eq!(reply_address("  plain@example.com "), "plain@example.com");
        assert_eq!(display_name("\"Lee\" <lee@example.com>"), "Lee");
        assert_eq!(display_name("<x@example.com>"), "x");
    }
}
