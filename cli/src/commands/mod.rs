pub mod cli;
pub mod loadtest;
pub mod precache;
pub mod signal;
