pub mod api;
pub mod archive;
pub mod arrival;
pub mod catalog;
pub mod error;
pub mod estimator;
pub mod fetch;
pub mod geo;
pub mod listener;
pub mod parser;
pub mod payload;
pub mod ranker;
pub mod reading;
pub mod relay;
pub mod store;
pub mod tracker;
