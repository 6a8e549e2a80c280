// Voice mock interviews: procedure-style create/update/feedback actions,
// read endpoints, and voice session tokens.

pub mod actions;
pub mod handlers;
pub mod prompts;
