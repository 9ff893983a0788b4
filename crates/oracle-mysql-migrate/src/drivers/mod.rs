//! Database driver implementations.

pub mod mysql;
pub mod oracle;

pub use mysql::MysqlWriter;
pub use oracle::OracleReader;
