pub mod app_config;
pub mod database;
pub mod events;
pub mod memory;
pub mod pg;

pub use database::DbClient;
pub use events::EventLog;
pub use memory::MemoryStore;
pub use pg::PgStore;
