pub mod backup_scheduler;
pub mod dump;
pub mod process;
pub mod restore;
pub mod retention;
pub mod tee;
