mod driver;

pub use driver::{MySqlAdapter, MySqlAdapterFactory};
