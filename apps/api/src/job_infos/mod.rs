// Job infos: the saved application context that scopes questions and
// interviews.

pub mod handlers;
