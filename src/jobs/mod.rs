pub mod list_sync;
