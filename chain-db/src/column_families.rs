//! Column family definitions for the consensus database
//!
//! This module defines the column families used to organize data
//! in the key-value store.

/// Column family names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnFamily {
    /// Default column family for misc data
    Default,
    /// Persisted consensus snapshots ("pbft-" ++ block_hash -> JSON(Snapshot))
    Snapshots,
}

impl ColumnFamily {
    /// Get the string name for this column family
    pub fn name(&self) -> &'static str {
        match self {
            ColumnFamily::Default => "default",
            ColumnFamily::Snapshots => "snapshots",
        }
    }

    /// Get all column families
    pub fn all() -> &'static [ColumnFamily] {
        &[ColumnFamily::Default, ColumnFamily::Snapshots]
    }

    /// Get column family from name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "default" => Some(ColumnFamily::Default),
            "snapshots" => Some(ColumnFamily::Snapshots),
            _ => None,
        }
    }
}

impl std::fmt::Display for ColumnFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_family_names() {
        assert_eq!(ColumnFamily::Default.name(), "default");
        assert_eq!(ColumnFamily::Snapshots.name(), "snapshots");
        assert_eq!(ColumnFamily::Snapshots.to_string(), "snapshots");
    }

    #[test]
    fn test_column_family_from_name() {
        for cf in ColumnFamily::all() {
            assert_eq!(ColumnFamily::from_name(cf.name()), Some(*cf));
        }
        assert_eq!(ColumnFamily::from_name("invalid"), None);
    }
}
