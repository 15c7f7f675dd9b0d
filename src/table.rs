use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::InvError;
use crate::rows::{Row, RowSet, Rows};
use crate::value::CellValue;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        Column {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Columnar in-memory table. Every column has exactly `row_count()` values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    nrows: usize,
}

impl Table {
    /// Builds a table from decoded columns, rejecting ragged or duplicate columns.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, InvError> {
        let mut seen = HashSet::new();
        for column in columns.iter() {
            if column.name.is_empty() {
                return Err(InvError::malformed("empty column name"));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(InvError::malformed(format!(
                    "duplicate column name \"{}\"",
                    column.name
                )));
            }
        }
        let nrows = columns.first().map(|c| c.len()).unwrap_or(0);
        if let Some(ragged) = columns.iter().find(|c| c.len() != nrows) {
            return Err(InvError::malformed(format!(
                "column \"{}\" has {} values, expected {}",
                ragged.name,
                ragged.len(),
                nrows
            )));
        }
        Ok(Table { columns, nrows })
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Result<&Column, InvError> {
        self.column_index(name)
            .map(|idx| &self.columns[idx])
            .ok_or_else(|| InvError::out_of_range(format!("unknown column \"{name}\"")))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.nrows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn get_cell(&self, column: &str, row: usize) -> Result<&CellValue, InvError> {
        let column = self.column(column)?;
        column.values.get(row).ok_or_else(|| {
            InvError::out_of_range(format!(
                "row {row} of column \"{}\" (table has {} rows)",
                column.name, self.nrows
            ))
        })
    }

    /// Stores `raw` after the same coercion the parser applies. Returns the stored value.
    pub fn set_cell(&mut self, column: &str, row: usize, raw: &str) -> Result<&CellValue, InvError> {
        let nrows = self.nrows;
        let idx = self
            .column_index(column)
            .ok_or_else(|| InvError::out_of_range(format!("unknown column \"{column}\"")))?;
        let cell = self.columns[idx].values.get_mut(row).ok_or_else(|| {
            InvError::out_of_range(format!(
                "row {row} of column \"{column}\" (table has {nrows} rows)"
            ))
        })?;
        *cell = CellValue::coerce(raw);
        Ok(cell)
    }

    /// Renames every column with `rename`. Fails if two columns end up with the same name.
    pub fn rename_columns(&mut self, rename: impl Fn(&str) -> String) -> Result<(), InvError> {
        let renamed: Vec<String> = self.columns.iter().map(|c| rename(&c.name)).collect();
        let mut seen = HashSet::new();
        for name in renamed.iter() {
            if name.is_empty() || !seen.insert(name.as_str()) {
                return Err(InvError::malformed(format!(
                    "column name \"{name}\" is empty or not unique after renaming"
                )));
            }
        }
        for (column, name) in self.columns.iter_mut().zip(renamed) {
            column.name = name;
        }
        Ok(())
    }

    /// Lazily projects rows from the current table state.
    pub fn rows(&self) -> Rows<'_> {
        Rows::new(self)
    }

    pub fn row(&self, index: usize) -> Result<Row, InvError> {
        if index >= self.nrows {
            return Err(InvError::out_of_range(format!(
                "row {index} (table has {} rows)",
                self.nrows
            )));
        }
        Ok(self.rows().header_row(index))
    }

    /// Owned snapshot of all rows, the input of the sort/filter/paginate engine.
    pub fn snapshot(&self) -> RowSet {
        let rows = self.rows();
        let header = rows.header();
        RowSet::new(header, rows.collect())
    }

    pub(crate) fn header(&self) -> Arc<[String]> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Serialized as a JSON object `{column: [values...]}` in column order.
impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in self.columns.iter() {
            map.serialize_entry(&column.name, &column.values)?;
        }
        map.end()
    }
}

struct TableVisitor;

impl<'de> Visitor<'de> for TableVisitor {
    type Value = Table;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping column names to value arrays")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Table, A::Error> {
        let mut columns = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, values)) = access.next_entry::<String, Vec<CellValue>>()? {
            columns.push(Column::new(name, values));
        }
        Table::from_columns(columns).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Table {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TableVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv;

    fn stock_table() -> Table {
        parse_csv("product_id,name,stock\nA001,Widget A,150\nA002,Widget B,300\n")
            .unwrap()
            .table
    }

    #[test]
    fn get_cell_out_of_range() {
        let table = stock_table();
        assert_eq!(table.get_cell("stock", 1).unwrap(), &CellValue::Number(300.0));
        assert!(matches!(
            table.get_cell("stock", 2),
            Err(InvError::OutOfRange(_))
        ));
        assert!(matches!(
            table.get_cell("price", 0),
            Err(InvError::OutOfRange(_))
        ));
    }

    #[test]
    fn set_cell_coerces_like_the_parser() {
        let mut table = stock_table();
        table.set_cell("stock", 0, "75").unwrap();
        assert_eq!(table.get_cell("stock", 0).unwrap(), &CellValue::Number(75.0));
        table.set_cell("stock", 1, " n/a ").unwrap();
        assert_eq!(table.get_cell("stock", 1).unwrap(), &CellValue::text("n/a"));
        table.set_cell("name", 1, "").unwrap();
        assert_eq!(table.get_cell("name", 1).unwrap(), &CellValue::Empty);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 3);
    }

    #[test]
    fn set_cell_rejects_bad_addresses_without_changes() {
        let mut table = stock_table();
        let before = table.clone();
        assert!(table.set_cell("stock", 5, "1").is_err());
        assert!(table.set_cell("nope", 0, "1").is_err());
        assert_eq!(table, before);
    }

    #[test]
    fn from_columns_rejects_ragged_columns() {
        let err = Table::from_columns(vec![
            Column::new("a", vec![CellValue::Number(1.0)]),
            Column::new("b", vec![]),
        ])
        .unwrap_err();
        assert!(matches!(err, InvError::MalformedInput(_)));
    }

    #[test]
    fn from_columns_rejects_duplicates() {
        let err = Table::from_columns(vec![
            Column::new("a", vec![]),
            Column::new("a", vec![]),
        ])
        .unwrap_err();
        assert!(matches!(err, InvError::MalformedInput(_)));
    }

    #[test]
    fn rename_columns_keeps_names_unique() {
        let mut table = Table::from_columns(vec![
            Column::new("Unit Cost", vec![]),
            Column::new("unit_cost", vec![]),
        ])
        .unwrap();
        assert!(table.rename_columns(|n| n.to_lowercase().replace(' ', "_")).is_err());
        assert_eq!(table.column_names(), vec!["Unit Cost", "unit_cost"]);
    }

    #[test]
    fn json_preserves_column_order_and_kinds() {
        let mut table = stock_table();
        table.set_cell("name", 0, "").unwrap();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(
            json,
            r#"{"product_id":["A001","A002"],"name":[null,"Widget B"],"stock":[150.0,300.0]}"#
        );
        let back: Table = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn json_with_ragged_columns_is_rejected() {
        let result: Result<Table, _> = serde_json::from_str(r#"{"a":[1,2],"b":[1]}"#);
        assert!(result.is_err());
    }
}
