pub mod aggregate;
pub mod apportion;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod resolve;
pub mod table;
pub mod tally;
