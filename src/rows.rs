use std::fmt;
use std::sync::Arc;

use crate::table::Table;
use crate::value::CellValue;

/// Identity of a row for UI addressing.
#[derive(Debug, Clone, PartialEq)]
pub enum RowId {
    /// `row index + 1`, used when the table has no `id` column.
    Synthetic(usize),
    /// Value of the table's `id`/`ID` column. Opaque.
    Column(CellValue),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Synthetic(n) => write!(f, "{n}"),
            RowId::Column(v) => write!(f, "{v}"),
        }
    }
}

/// One row projected out of a [`Table`]. Ephemeral: regenerate instead of storing.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Index of the row in the source table. Edits are written back through it.
    pub index: usize,
    pub id: RowId,
    header: Arc<[String]>,
    values: Vec<CellValue>,
}

impl Row {
    pub fn new(index: usize, id: RowId, header: Arc<[String]>, values: Vec<CellValue>) -> Self {
        Row {
            index,
            id,
            header,
            values,
        }
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.header
            .iter()
            .position(|name| name == column)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// (column name, value) pairs in header order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.header
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Position of the identity column, if any: the first column named `id` or `ID`.
pub fn id_column(header: &[String]) -> Option<usize> {
    header.iter().position(|name| name == "id" || name == "ID")
}

/// Lazy row projection. Created by [`Table::rows`]; every call starts over from
/// the table's current state.
pub struct Rows<'a> {
    table: &'a Table,
    header: Arc<[String]>,
    id_column: Option<usize>,
    next: usize,
}

impl<'a> Rows<'a> {
    pub(crate) fn new(table: &'a Table) -> Self {
        let header = table.header();
        let id_column = id_column(&header);
        Rows {
            table,
            header,
            id_column,
            next: 0,
        }
    }

    pub fn header(&self) -> Arc<[String]> {
        Arc::clone(&self.header)
    }

    pub(crate) fn header_row(&self, index: usize) -> Row {
        let values: Vec<CellValue> = self
            .table
            .columns()
            .iter()
            .map(|c| c.values[index].clone())
            .collect();
        let id = match self.id_column {
            Some(cidx) => RowId::Column(values[cidx].clone()),
            None => RowId::Synthetic(index + 1),
        };
        Row::new(index, id, Arc::clone(&self.header), values)
    }
}

impl Iterator for Rows<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.next >= self.table.row_count() {
            return None;
        }
        let row = self.header_row(self.next);
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.row_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Rows<'_> {}

/// Owned snapshot of rows sharing one header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    header: Arc<[String]>,
    rows: Vec<Row>,
}

impl RowSet {
    pub fn new(header: Arc<[String]>, rows: Vec<Row>) -> Self {
        RowSet { header, rows }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn shared_header(&self) -> Arc<[String]> {
        Arc::clone(&self.header)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv;

    #[test]
    fn synthetic_ids_are_one_based() {
        let table = parse_csv("sku,qty\nA,1\nB,2\nC,3\n").unwrap().table;
        let ids: Vec<RowId> = table.rows().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![RowId::Synthetic(1), RowId::Synthetic(2), RowId::Synthetic(3)]
        );
    }

    #[test]
    fn id_column_is_used_as_identity() {
        let table = parse_csv("ID,name\n17,a\nx9,b\n").unwrap().table;
        let ids: Vec<RowId> = table.rows().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![
                RowId::Column(CellValue::Number(17.0)),
                RowId::Column(CellValue::text("x9"))
            ]
        );
    }

    #[test]
    fn rows_are_regenerated_from_current_state() {
        let mut table = parse_csv("sku,qty\nA,1\nB,2\n").unwrap().table;
        let first: Vec<Row> = table.rows().collect();
        table.set_cell("qty", 1, "20").unwrap();
        let second: Vec<Row> = table.rows().collect();
        assert_eq!(first[1].get("qty"), Some(&CellValue::Number(2.0)));
        assert_eq!(second[1].get("qty"), Some(&CellValue::Number(20.0)));
        assert_eq!(table.rows().len(), 2);
    }

    #[test]
    fn cells_follow_header_order() {
        let table = parse_csv("b,a\n1,2\n").unwrap().table;
        let row = table.row(0).unwrap();
        let names: Vec<&str> = row.cells().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(table.row(1).is_err());
    }
}
