pub mod cli;
pub mod config;
pub mod helper;
pub mod provider;
pub mod provider_cos;
pub mod provider_oss;
pub mod transfer;
pub mod updater;
