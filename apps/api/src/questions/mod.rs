// Practice questions: streamed generation per job info and streamed
// feedback on a candidate's answer.
// All LLM calls go through llm_client.

pub mod handlers;
pub mod prompts;
