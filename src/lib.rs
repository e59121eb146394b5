pub mod completion;
pub mod config;
pub mod error;
pub mod indexer;
pub mod knowledge;
pub mod models;
pub mod rag;
pub mod server;

#[cfg(test)]
mod testing;
