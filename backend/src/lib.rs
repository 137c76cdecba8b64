pub mod cache;
pub mod classifier;
pub mod config;
pub mod ensemble;
pub mod nutrition;
pub mod pipeline;
pub mod portion;
pub mod preprocess;
pub mod routes;
