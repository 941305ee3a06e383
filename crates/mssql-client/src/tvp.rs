//! Table-Valued Parameters (TVP) support.
//!
//! TVPs allow passing collections of structured data to SQL Server stored
//! procedures as a single parameter. This is more efficient than:
//! - Multiple INSERT statements
//! - String concatenation of values
//! - Temporary tables
//!
//! ## Usage
//!
//! First, create a table type in SQL Server:
//!
//! ```sql
//! CREATE TYPE dbo.UserIdList AS TABLE (
//!     UserId INT NOT NULL
//! );
//! ```
//!
//! Then implement [`Tvp`] for the Rust type mirroring each row:
//!
//! ```rust,ignore
//! use mssql_client::{Tvp, TvpColumn, TvpRow, TvpValue};
//! use mssql_types::{SqlValue, ToSql, TvpColumnType, TypeError};
//!
//! struct UserIdList {
//!     user_id: i32,
//! }
//!
//! impl Tvp for UserIdList {
//!     fn type_name() -> &'static str {
//!         "dbo.UserIdList"
//!     }
//!
//!     fn columns() -> Vec<TvpColumn> {
//!         vec![TvpColumn::new("UserId", TvpColumnType::Int, false)]
//!     }
//!
//!     fn to_row(&self) -> Result<TvpRow, TypeError> {
//!         Ok(TvpRow::new(vec![self.user_id.to_sql()?]))
//!     }
//! }
//!
//! let user_ids = vec![
//!     UserIdList { user_id: 1 },
//!     UserIdList { user_id: 2 },
//!     UserIdList { user_id: 3 },
//! ];
//!
//! client.execute(
//!     "EXEC GetUserDetails @UserIds = @user_ids",
//!     &[&TvpValue::new(&user_ids)?],
//! ).await?;
//! ```

use mssql_types::{SqlValue, ToSql, TvpColumnDef, TvpColumnType, TvpData, TypeError};

/// Metadata for a TVP column.
#[derive(Debug, Clone)]
pub struct TvpColumn {
    /// Column name. SQL Server requires this be sent as zero-length on the
    /// wire, but it is kept here for diagnostics and declaration clarity.
    pub name: String,
    /// Wire type of the column.
    pub column_type: TvpColumnType,
    /// Whether NULL is a legal value for this column.
    pub nullable: bool,
}

impl TvpColumn {
    /// Create a new TVP column definition.
    pub fn new(name: impl Into<String>, column_type: TvpColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
        }
    }
}

/// A row in a table-valued parameter.
#[derive(Debug, Clone)]
pub struct TvpRow {
    /// Values for each column.
    pub values: Vec<SqlValue>,
}

impl TvpRow {
    /// Create a new TVP row from values.
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    /// Get the value at the given index.
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Get the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Trait for types that can be used as table-valued parameters.
pub trait Tvp {
    /// Get the SQL Server type name for this TVP (e.g. `"dbo.UserIdList"`).
    ///
    /// This must match a user-defined table type in the database.
    fn type_name() -> &'static str;

    /// Get the column definitions for this TVP, in declaration order.
    fn columns() -> Vec<TvpColumn>;

    /// Convert this struct to a TVP row.
    ///
    /// # Errors
    ///
    /// Returns an error if any field value cannot be converted to a SQL value.
    fn to_row(&self) -> Result<TvpRow, TypeError>;
}

/// A table-valued parameter value that can be passed to a stored procedure.
///
/// This wraps a collection of `Tvp` items and provides the necessary metadata
/// for the TDS protocol.
#[derive(Debug, Clone)]
pub struct TvpValue {
    /// The SQL Server type name.
    pub type_name: String,
    /// Column definitions.
    pub columns: Vec<TvpColumn>,
    /// The rows of data.
    pub rows: Vec<TvpRow>,
}

impl TvpValue {
    /// Create a TVP value from a slice of items implementing `Tvp`.
    ///
    /// # Errors
    ///
    /// Returns an error if any item cannot be converted to a row.
    pub fn new<T: Tvp>(items: &[T]) -> Result<Self, TypeError> {
        let rows: Result<Vec<TvpRow>, TypeError> = items.iter().map(|item| item.to_row()).collect();

        Ok(Self {
            type_name: T::type_name().to_string(),
            columns: T::columns(),
            rows: rows?,
        })
    }

    /// Create an empty TVP value with the given type name and columns.
    pub fn empty<T: Tvp>() -> Self {
        Self {
            type_name: T::type_name().to_string(),
            columns: T::columns(),
            rows: Vec::new(),
        }
    }

    /// Get the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the TVP is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over the rows.
    pub fn iter(&self) -> impl Iterator<Item = &TvpRow> {
        self.rows.iter()
    }
}

impl ToSql for TvpValue {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        let columns = self
            .columns
            .iter()
            .map(|c| TvpColumnDef::new(c.name.clone(), c.column_type, c.nullable))
            .collect();
        let rows = self.rows.iter().map(|r| r.values.clone()).collect();

        // `type_name()` is schema-qualified (e.g. "dbo.UserIdList"); the wire
        // format needs the schema and bare type name as separate fields.
        let (schema, type_name) = match self.type_name.split_once('.') {
            Some((schema, name)) => (schema.to_string(), name.to_string()),
            None => (String::new(), self.type_name.clone()),
        };

        Ok(SqlValue::Tvp(TvpData {
            schema,
            type_name,
            columns,
            rows,
        }))
    }

    fn sql_type(&self) -> &'static str {
        "TVP"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct TestUserId {
        user_id: i32,
    }

    impl Tvp for TestUserId {
        fn type_name() -> &'static str {
            "dbo.UserIdList"
        }

        fn columns() -> Vec<TvpColumn> {
            vec![TvpColumn::new("UserId", TvpColumnType::Int, false)]
        }

        fn to_row(&self) -> Result<TvpRow, TypeError> {
            Ok(TvpRow::new(vec![self.user_id.to_sql()?]))
        }
    }

    #[test]
    fn test_tvp_trait_impl() {
        assert_eq!(TestUserId::type_name(), "dbo.UserIdList");

        let columns = TestUserId::columns();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "UserId");
        assert_eq!(columns[0].column_type, TvpColumnType::Int);
    }

    #[test]
    fn test_tvp_row_creation() {
        let item = TestUserId { user_id: 42 };
        let row = item.to_row().unwrap();

        assert_eq!(row.len(), 1);
        assert!(matches!(row.get(0), Some(SqlValue::Int(42))));
    }

    #[test]
    fn test_tvp_value_creation() {
        let items = vec![
            TestUserId { user_id: 1 },
            TestUserId { user_id: 2 },
            TestUserId { user_id: 3 },
        ];

        let tvp = TvpValue::new(&items).unwrap();

        assert_eq!(tvp.type_name, "dbo.UserIdList");
        assert_eq!(tvp.columns.len(), 1);
        assert_eq!(tvp.len(), 3);
    }

    #[test]
    fn test_tvp_value_empty() {
        let tvp: TvpValue = TvpValue::empty::<TestUserId>();

        assert_eq!(tvp.type_name, "dbo.UserIdList");
        assert!(tvp.is_empty());
    }

    #[test]
    fn test_tvp_column() {
        let col = TvpColumn::new("TestCol", TvpColumnType::NVarChar { max_length: 100 }, true);

        assert_eq!(col.name, "TestCol");
        assert_eq!(col.column_type, TvpColumnType::NVarChar { max_length: 100 });
        assert!(col.nullable);
    }

    #[test]
    fn test_tvp_value_to_sql_produces_tvp_data() {
        let items = vec![TestUserId { user_id: 7 }];
        let tvp = TvpValue::new(&items).unwrap();

        let sql_value = tvp.to_sql().unwrap();
        match sql_value {
            SqlValue::Tvp(data) => {
                assert_eq!(data.type_name, "dbo.UserIdList");
                assert_eq!(data.rows.len(), 1);
                assert_eq!(data.columns.len(), 1);
            }
            other => panic!("expected SqlValue::Tvp, got {other:?}"),
        }
    }
}
