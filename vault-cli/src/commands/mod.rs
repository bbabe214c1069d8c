mod backup;
mod docs;
mod drive;
mod restore;
mod scheduler;
mod status;

// Status commands
pub use status::run_status;

// Backup commands
pub use backup::{run_backup_create, run_backup_delete, run_backup_list, run_backup_verify};

// Restore commands
pub use restore::{run_restore_local, run_restore_remote};

// Scheduler commands
pub use scheduler::{run_scheduler_daemon, run_scheduler_status};

// Drive commands
pub use drive::{
    run_drive_connect, run_drive_disconnect, run_drive_list, run_drive_pull, run_drive_push,
    run_drive_status,
};

// Docs commands
pub use docs::{run_docs_count, run_docs_import};
