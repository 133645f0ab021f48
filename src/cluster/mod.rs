//! Module that contains the partitioning and consistency algorithms for ringdb
pub mod consistency;
pub mod load_balancing;
pub mod node;
pub mod partition_table;
pub mod partitioning;
pub mod quorum;
pub mod state;
pub mod token;
