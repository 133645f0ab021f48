//! Module that contains utility functions for fault injection in test code
pub mod fault;
