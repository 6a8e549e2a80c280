// LLM prompts for the Interviews module.

use crate::llm_client::prompts::{job_info_context, MARKDOWN_OUTPUT_INSTRUCTION};
use crate::llm_client::LlmRequest;
use crate::models::JobInfo;
use crate::voice::CondensedMessage;

/// System prompt for interview feedback. Replace `{job_context}` and
/// `{candidate}`.
const FEEDBACK_SYSTEM_TEMPLATE: &str = r#"You are an expert interview coach reviewing the transcript of a mock job interview.
The candidate's name is {candidate}. Speak to them directly in the second person.

{job_context}

Evaluate the candidate in these categories, each under its own `##` heading with a score from 1 to 10:
1. Communication Clarity
2. Confidence and Emotional State
3. Response Quality
4. Pacing and Timing
5. Engagement and Interaction
6. Role Fit and Alignment

For each category quote or reference specific moments from the transcript, then give concrete suggestions.
Finish with `## Overall Rating: N/10` and a short summary of the most important improvements."#;

/// Renders the condensed transcript, one speaker turn per paragraph.
pub fn render_transcript(messages: &[CondensedMessage], candidate: &str) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = if m.is_user { candidate } else { "Interviewer" };
            format!("{speaker}: {}", m.content.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn feedback_request(
    job_info: &JobInfo,
    candidate: &str,
    duration: &str,
    messages: &[CondensedMessage],
) -> LlmRequest {
    let system = format!(
        "{}\n\n{}",
        FEEDBACK_SYSTEM_TEMPLATE
            .replace("{job_context}", &job_info_context(job_info))
            .replace("{candidate}", candidate),
        MARKDOWN_OUTPUT_INSTRUCTION
    );

    LlmRequest::new(system).user(format!(
        "Interview duration: {duration}\n\nTRANSCRIPT:\n{}",
        render_transcript(messages, candidate)
    ))
}
