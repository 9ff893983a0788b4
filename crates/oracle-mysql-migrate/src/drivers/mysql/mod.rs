//! MySQL destination driver support.

pub mod writer;

pub use writer::MysqlWriter;
