mod articles;
mod memory;
mod schema;
mod sources;
mod store;
mod types;

pub use articles::SqliteTransaction;
pub use memory::MemoryStore;
pub use schema::Database;
pub use store::{ArticleStore, StoreTransaction};
pub use types::{FeedHandle, StorageError, StoredArticle};
