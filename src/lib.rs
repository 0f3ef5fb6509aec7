pub mod auth;
pub mod cascade;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod privilege;
pub mod records;
pub mod removal;
pub mod resolve;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod state;
pub mod storage;
pub mod supabase;

pub mod utils {
    pub mod json;
}

pub use cascade::{CascadeError, CascadeExecutor, DeletionReport};
pub use state::AppState;
