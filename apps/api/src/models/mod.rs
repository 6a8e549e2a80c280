pub mod interview;
pub mod job_info;
pub mod question;
pub mod user;

pub use interview::{Interview, InterviewChanges, NewInterview};
pub use job_info::{ExperienceLevel, JobInfo, JobInfoChanges, NewJobInfo};
pub use question::{NewQuestion, Question, QuestionDifficulty};
pub use user::{NewUser, User};
