// LLM prompts for the Questions module.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{job_info_context, MARKDOWN_OUTPUT_INSTRUCTION};
use crate::llm_client::LlmRequest;
use crate::models::{JobInfo, Question, QuestionDifficulty};

/// System prompt for question generation. Replace `{job_context}`.
const QUESTION_SYSTEM_TEMPLATE: &str = "You are an expert technical interviewer \
    preparing a candidate for a specific job. \
    Each user message is a difficulty level (easy, medium or hard); reply with exactly \
    ONE new interview question of that difficulty for the job below. \
    The question may be technical, behavioral or a short scenario, whichever fits the role. \
    Do NOT repeat or rephrase a question you already asked in this conversation. \
    Do NOT include the answer, hints, or a heading.\n\n{job_context}";

/// System prompt for answer feedback.
const FEEDBACK_SYSTEM: &str = "You are an expert interviewer reviewing a candidate's \
    answer to an interview question. \
    Start with a rating from 1 to 10 formatted as `## Rating: N/10`. \
    Then give concise, constructive feedback: what was strong, what was missing, \
    and how to improve. \
    Finish with a section titled `## Model Answer` containing a complete answer \
    to the question.";

/// Builds a conversation that replays every previous question for the job
/// info so the model avoids duplicates.
pub fn question_request(
    job_info: &JobInfo,
    previous: &[Question],
    difficulty: QuestionDifficulty,
) -> LlmRequest {
    let system = format!(
        "{}\n\n{}",
        QUESTION_SYSTEM_TEMPLATE.replace("{job_context}", &job_info_context(job_info)),
        MARKDOWN_OUTPUT_INSTRUCTION
    );

    previous
        .iter()
        .fold(LlmRequest::new(system), |request, question| {
            request
                .user(question.difficulty.as_str())
                .assistant(question.text.as_str())
        })
        .user(difficulty.as_str())
}

pub fn feedback_request(question: &str, answer: &str) -> LlmRequest {
    LlmRequest::new(format!("{FEEDBACK_SYSTEM}\n\n{MARKDOWN_OUTPUT_INSTRUCTION}")).user(format!(
        "Question:\n{}\n\nAnswer:\n{}",
        question.trim(),
        answer.trim()
    ))
}
