pub mod config;
pub mod error;
pub mod helper;
pub mod modules;
pub mod pipeline;
pub mod server;
pub mod triton_client;
pub mod utils;

#[cfg(test)]
mod test_support;
