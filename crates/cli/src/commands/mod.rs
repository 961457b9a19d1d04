pub mod activate;
pub mod build;
pub mod config_cmd;
