// The signed-in user's record, synced from session claims.

pub mod handlers;
