// LLM prompts for the Resumes module.

use crate::llm_client::prompts::{job_info_context, NO_FABRICATION_INSTRUCTION};
use crate::llm_client::LlmRequest;
use crate::models::JobInfo;

/// System prompt for resume analysis. Replace `{job_context}`.
const ANALYSIS_SYSTEM_TEMPLATE: &str = r#"You are an expert resume reviewer and hiring manager.
Evaluate the candidate's resume against the job below.

{job_context}

You MUST respond with valid JSON only, using this EXACT schema (no extra fields):
{
  "overallScore": 7,
  "ats": { "score": 8, "summary": "...", "feedback": [] },
  "jobMatch": { "score": 6, "summary": "...", "feedback": [] },
  "writingAndFormatting": { "score": 7, "summary": "...", "feedback": [] },
  "keywordCoverage": { "score": 5, "summary": "...", "feedback": [] },
  "other": { "score": 7, "summary": "...", "feedback": [] }
}

Every score is an integer from 1 to 10.
Each feedback entry has the shape
  { "type": "strength" | "minor-improvement" | "major-improvement", "name": "...", "message": "..." }

CATEGORIES:
- ats: how well automated applicant tracking systems can parse the resume (layout, headings, file-friendly structure).
- jobMatch: alignment of skills, experience and seniority with the job description and experience level.
- writingAndFormatting: clarity, concision, grammar, consistent formatting, quantified impact.
- keywordCoverage: presence of the important technologies and terms from the job description.
- other: anything else that helps or hurts the application.

Do NOT use markdown code fences.
Do NOT include any text outside the JSON object."#;

pub fn analysis_request(job_info: &JobInfo, resume_text: &str) -> LlmRequest {
    let system = format!(
        "{}\n\n{}",
        ANALYSIS_SYSTEM_TEMPLATE.replace("{job_context}", &job_info_context(job_info)),
        NO_FABRICATION_INSTRUCTION
    );
    LlmRequest::new(system).user(format!("RESUME:\n{resume_text}"))
}
