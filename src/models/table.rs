//! Table metadata produced by the schema introspector.

use crate::models::Dialect;
use crate::typemap::{self, LogicalType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Native type string as the catalog spelled it, e.g. `varchar(255)`.
    pub native_type: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub primary_key: bool,
    pub auto_increment: bool,
}

impl ColumnInfo {
    /// Create a nullable column; the logical type is derived from `native_type`.
    pub fn new(name: impl Into<String>, native_type: impl Into<String>) -> Self {
        let native_type = native_type.into();
        Self {
            name: name.into(),
            logical_type: typemap::classify(&native_type),
            native_type,
            nullable: true,
            default: None,
            primary_key: false,
            auto_increment: false,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_default(mut self, default: Option<String>) -> Self {
        self.default = default;
        self
    }

    pub fn with_primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn with_auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }
}

/// `FOREIGN KEY (column) REFERENCES referenced_table (referenced_column)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// A table with its columns in catalog order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Keyed by column name; iteration order is the catalog order.
    pub columns: IndexMap<String, ColumnInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            columns: IndexMap::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.push_column(column);
        self
    }

    /// Append a column. A repeated name keeps its first position.
    pub fn push_column(&mut self, column: ColumnInfo) {
        self.columns.insert(column.name.clone(), column);
    }

    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.get(name)
    }

    /// Column name to logical type, in catalog order.
    pub fn logical_types(&self) -> impl Iterator<Item = (&str, LogicalType)> {
        self.columns
            .values()
            .map(|c| (c.name.as_str(), c.logical_type))
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .values()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// What one export pass emits for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
    Structure,
    Data,
    #[default]
    Both,
}

impl ExportScope {
    /// Scope from the request flags; `None` when neither is set.
    pub fn from_flags(structure: bool, data: bool) -> Option<Self> {
        match (structure, data) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::Structure),
            (false, true) => Some(Self::Data),
            (false, false) => None,
        }
    }

    pub fn includes_structure(&self) -> bool {
        matches!(self, Self::Structure | Self::Both)
    }

    pub fn includes_data(&self) -> bool {
        matches!(self, Self::Data | Self::Both)
    }
}

/// `{table, schema, target dialect}` driving one export pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportUnit {
    pub table: String,
    pub schema: Option<String>,
    pub target: Dialect,
    pub scope: ExportScope,
}

impl ExportUnit {
    pub fn new(table: impl Into<String>, target: Dialect) -> Self {
        Self {
            table: table.into(),
            schema: None,
            target,
            scope: ExportScope::Both,
        }
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_scope(mut self, scope: ExportScope) -> Self {
        self.scope = scope;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_keeps_catalog_order() {
        let table = TableDescriptor::new("orders")
            .with_column(ColumnInfo::new("zeta", "int"))
            .with_column(ColumnInfo::new("alpha", "varchar(20)"))
            .with_column(ColumnInfo::new("mid", "datetime"));
        let names: Vec<_> = table.logical_types().map(|(n, _)| n).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(
            table.column("mid").map(|c| c.logical_type),
            Some(LogicalType::DateTime)
        );
    }

    #[test]
    fn test_descriptor_json_keeps_column_order() {
        let table = TableDescriptor::new("orders")
            .with_column(ColumnInfo::new("zeta", "int").with_primary_key(true))
            .with_column(ColumnInfo::new("alpha", "text"));
        let json = serde_json::to_string(&table).unwrap();
        let parsed: TableDescriptor = serde_json::from_str(&json).unwrap();
        let names: Vec<_> = parsed.columns.keys().map(String::as_str).collect();
        assert_eq!(names, ["zeta", "alpha"]);
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_primary_key_columns() {
        let table = TableDescriptor::new("t")
            .with_column(ColumnInfo::new("a", "int").with_primary_key(true))
            .with_column(ColumnInfo::new("b", "int"))
            .with_column(ColumnInfo::new("c", "int").with_primary_key(true));
        assert_eq!(table.primary_key(), ["a", "c"]);
    }

    #[test]
    fn test_scope_flags() {
        assert_eq!(ExportScope::from_flags(true, true), Some(ExportScope::Both));
        assert_eq!(ExportScope::from_flags(false, false), None);
        assert!(ExportScope::Structure.includes_structure());
        assert!(!ExportScope::Structure.includes_data());
        assert!(ExportScope::Data.includes_data());
    }
}
