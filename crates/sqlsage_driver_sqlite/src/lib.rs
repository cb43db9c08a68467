mod driver;

pub use driver::{SqliteAdapter, SqliteAdapterFactory};
