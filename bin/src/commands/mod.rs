pub mod delete;
pub mod history;
pub mod snapshot;
pub mod watch;
