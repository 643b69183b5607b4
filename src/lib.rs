pub mod core;
pub mod db;
pub mod jobs;
pub mod models;
pub mod recruitment_list_server;
pub mod routes;
pub mod study;
pub mod sync;
