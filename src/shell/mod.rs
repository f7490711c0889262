mod sgbd;

pub use sgbd::{Command, CommandOutcome, Sgbd};
