//! Column metadata reported by the source catalog.

/// One column of a source table, as described by the catalog views.
///
/// Drives the projection built at planning time and the codec's per-column
/// decisions. `data_scale` is only meaningful for TIMESTAMP columns, where it
/// selects the fractional-second format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// 1-based ordinal position.
    pub ordinal: i32,

    /// Column name as stored (upper-case in Oracle unless quoted).
    pub name: String,

    /// Declared data type, e.g. `NUMBER`, `VARCHAR2`, `TIMESTAMP(6)`.
    pub data_type: String,

    /// Declared scale, when the catalog reports one.
    pub data_scale: Option<i32>,

    /// Column collation. Only populated on catalogs new enough to report
    /// per-column collation (12.2+).
    pub collation: Option<String>,
}

impl ColumnInfo {
    /// Create a column description.
    pub fn new(ordinal: i32, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            ordinal,
            name: name.into(),
            data_type: data_type.into(),
            data_scale: None,
            collation: None,
        }
    }

    /// Set the declared scale.
    pub fn with_scale(mut self, scale: i32) -> Self {
        self.data_scale = Some(scale);
        self
    }
}
