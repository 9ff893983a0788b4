//! Oracle source driver support: dialect SQL and the reader.

pub mod dialect;
pub mod reader;

pub use reader::OracleReader;
