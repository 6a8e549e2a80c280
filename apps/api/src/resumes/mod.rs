// Resume analysis against a saved job info.
// Text extraction runs on the blocking pool; the report is streamed back.

pub mod extract;
pub mod handlers;
pub mod prompts;
pub mod word;
