// Shared prompt constants and prompt-building utilities.
// Each feature that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

use crate::models::JobInfo;

/// Appended to every system prompt whose output is rendered as markdown.
pub const MARKDOWN_OUTPUT_INSTRUCTION: &str = "\
    Format your response in markdown. \
    Do NOT wrap the whole response in a code fence. \
    Do NOT add a preamble or closing remarks.";

/// Instruction that keeps the model from inventing facts about the candidate.
pub const NO_FABRICATION_INSTRUCTION: &str = "\
    Only refer to information that is present in the provided material. \
    Do NOT invent employers, projects, metrics, or qualifications.";

/// Renders the job context block shared by every feature prompt.
pub fn job_info_context(job_info: &JobInfo) -> String {
    format!(
        "Job title: {}\nExperience level: {}\nJob description:\n{}",
        job_info.title,
        job_info.experience_level.as_str(),
        job_info.description.trim()
    )
}
