pub mod command_executor;
pub mod incremental_mean;
