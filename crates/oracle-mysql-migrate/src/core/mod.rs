//! Core abstractions shared by the migration engine.

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::ColumnInfo;
pub use traits::{
    ChunkQuery, ChunkRows, ColumnDesc, RawRow, RawStream, RawTable, SinkWriter, SourceClient,
    SourceReader,
};
pub use value::{ColumnKind, ScanKind};
