pub mod content_sync;
