mod config;
mod store;

pub use config::MongoConfig;
pub use store::{MongoCollection, MongoConnector};
