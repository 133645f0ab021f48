pub mod cluster;
pub mod config;
pub mod db;
pub mod error;
pub mod storage;
pub mod telemetry;
pub mod test_utils;
pub mod transport;
pub mod utils;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
