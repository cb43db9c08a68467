mod driver;

pub use driver::{PostgresAdapter, PostgresAdapterFactory};
