pub mod config;
pub mod corpus;
pub mod network;
pub mod storage;
