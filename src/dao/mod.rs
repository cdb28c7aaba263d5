/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
/// Timer aggregate storage backends.
pub mod timer_store;
