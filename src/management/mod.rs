mod auth;
mod store;

pub use auth::TokenManager;
pub use auth::TokenProvider;
pub use store::FileStore;
pub use store::MemoryStore;
pub use store::SessionStore;
pub use store::StoreKey;
