mod init;
mod retry_missing;
mod run;
mod status;

pub use init::cmd_init;
pub use retry_missing::cmd_retry_missing;
pub use run::cmd_run;
pub use status::cmd_status;
