mod driver;

pub use driver::{OracleAdapter, OracleAdapterFactory};
