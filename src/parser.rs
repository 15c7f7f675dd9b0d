//! Comma-split CSV reader producing a columnar [`Table`].
//!
//! The reader is deliberately not quote-aware: every `,` separates fields and
//! `"` characters are kept as part of the value. Files with quoted fields that
//! contain commas or line breaks will be split at those characters.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, warn};

use crate::domain::InvError;
use crate::table::{Column, Table};
use crate::value::CellValue;

/// A data line whose field count did not match the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecovery {
    /// 1-based line number in the input text.
    pub line: usize,
    pub expected: usize,
    pub found: usize,
}

impl RowRecovery {
    /// Short fields were padded with empty cells.
    pub fn padded(&self) -> bool {
        self.found < self.expected
    }

    /// Surplus fields were dropped.
    pub fn truncated(&self) -> bool {
        self.found > self.expected
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    pub table: Table,
    pub recoveries: Vec<RowRecovery>,
}

/// Parses `text` into a table.
///
/// The first non-empty line is the header. Blank lines are skipped. A data
/// line with too few fields is padded with `Empty`, one with too many fields
/// loses the surplus; both are reported in [`ParsedCsv::recoveries`].
pub fn parse_csv(text: &str) -> Result<ParsedCsv, InvError> {
    let start_time = Instant::now();
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((_, header_line)) = lines.next() else {
        return Err(InvError::malformed("input is empty"));
    };
    let header = parse_header(header_line)?;

    let mut data: Vec<Vec<CellValue>> = header.iter().map(|_| Vec::new()).collect();
    let mut recoveries = Vec::new();
    let mut nrows = 0;
    for (lidx, line) in lines {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != header.len() {
            let recovery = RowRecovery {
                line: lidx + 1,
                expected: header.len(),
                found: fields.len(),
            };
            warn!(
                "Line {}: expected {} fields, found {}; {}",
                recovery.line,
                recovery.expected,
                recovery.found,
                if recovery.padded() { "padding with empty cells" } else { "dropping extra fields" }
            );
            recoveries.push(recovery);
        }
        for (cidx, column) in data.iter_mut().enumerate() {
            let value = fields
                .get(cidx)
                .map(|f| CellValue::coerce(f))
                .unwrap_or(CellValue::Empty);
            column.push(value);
        }
        nrows += 1;
    }

    if nrows == 0 {
        return Err(InvError::malformed(
            "CSV input needs a header row and at least one data row",
        ));
    }

    let columns = header
        .into_iter()
        .zip(data)
        .map(|(name, values)| Column::new(name, values))
        .collect();
    let table = Table::from_columns(columns)?;

    debug!(
        "Parsed {} rows x {} columns in {}ms ({} recovered lines)",
        table.row_count(),
        table.column_count(),
        start_time.elapsed().as_millis(),
        recoveries.len()
    );
    Ok(ParsedCsv { table, recoveries })
}

fn parse_header(line: &str) -> Result<Vec<String>, InvError> {
    let names: Vec<String> = line.split(',').map(|h| h.trim().to_string()).collect();
    let mut seen = HashSet::new();
    for (idx, name) in names.iter().enumerate() {
        if name.is_empty() {
            return Err(InvError::malformed(format!(
                "header field {} is empty",
                idx + 1
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(InvError::malformed(format!(
                "duplicate header name \"{name}\""
            )));
        }
    }
    Ok(names)
}

/// Upload-time header cleaning: lowercase, spaces replaced by underscores.
pub fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::RowId;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_inventory_scenario() {
        let parsed =
            parse_csv("product_id,name,stock\nA001,Widget A,150\nA002,Widget B,300\n").unwrap();
        let table = parsed.table;
        assert_eq!(table.column_names(), vec!["product_id", "name", "stock"]);
        assert_eq!(
            table.column("product_id").unwrap().values,
            vec![CellValue::text("A001"), CellValue::text("A002")]
        );
        assert_eq!(
            table.column("name").unwrap().values,
            vec![CellValue::text("Widget A"), CellValue::text("Widget B")]
        );
        assert_eq!(
            table.column("stock").unwrap().values,
            vec![CellValue::Number(150.0), CellValue::Number(300.0)]
        );
        assert_eq!(table.row_count(), 2);
        assert!(parsed.recoveries.is_empty());
    }

    #[test]
    fn leading_byte_order_mark_is_dropped() {
        let table = parse_csv("\u{feff}id,name\n1,a\n").unwrap().table;
        assert_eq!(table.column_names(), vec!["id", "name"]);
        let rows = table.snapshot();
        assert_eq!(rows.rows()[0].id, RowId::Column(CellValue::Number(1.0)));
    }

    #[test]
    fn accepts_crlf_and_blank_lines() {
        let table = parse_csv("a, b \r\n\r\n 1 ,x\r\n\n2,y\r\n").unwrap().table;
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get_cell("a", 0).unwrap(), &CellValue::Number(1.0));
        assert_eq!(table.get_cell("b", 1).unwrap(), &CellValue::text("y"));
    }

    #[test]
    fn header_only_is_malformed() {
        assert!(matches!(
            parse_csv("a,b\n"),
            Err(InvError::MalformedInput(_))
        ));
        assert!(matches!(parse_csv(""), Err(InvError::MalformedInput(_))));
        assert!(matches!(
            parse_csv("\n \n"),
            Err(InvError::MalformedInput(_))
        ));
    }

    #[test]
    fn duplicate_or_empty_header_is_malformed() {
        assert!(matches!(
            parse_csv("a,b,a\n1,2,3\n"),
            Err(InvError::MalformedInput(_))
        ));
        assert!(matches!(
            parse_csv("a,,c\n1,2,3\n"),
            Err(InvError::MalformedInput(_))
        ));
    }

    #[test]
    fn short_rows_are_padded_and_long_rows_truncated() {
        let parsed = parse_csv("a,b,c\n1,2\n1,2,3,4\n").unwrap();
        let table = parsed.table;
        assert_eq!(table.get_cell("c", 0).unwrap(), &CellValue::Empty);
        assert_eq!(table.get_cell("c", 1).unwrap(), &CellValue::Number(3.0));
        assert_eq!(table.column_count(), 3);
        assert_eq!(
            parsed.recoveries,
            vec![
                RowRecovery { line: 2, expected: 3, found: 2 },
                RowRecovery { line: 3, expected: 3, found: 4 },
            ]
        );
        assert!(parsed.recoveries[0].padded());
        assert!(parsed.recoveries[1].truncated());
    }

    #[test]
    fn empty_fields_stay_empty() {
        let table = parse_csv("a,b\n,0\n").unwrap().table;
        assert_eq!(table.get_cell("a", 0).unwrap(), &CellValue::Empty);
        assert_eq!(table.get_cell("b", 0).unwrap(), &CellValue::Number(0.0));
    }

    #[test]
    fn quotes_are_not_interpreted() {
        let parsed = parse_csv("name,city\n\"Acme, Inc.\",Berlin\n").unwrap();
        let table = parsed.table;
        assert_eq!(table.get_cell("name", 0).unwrap(), &CellValue::text("\"Acme"));
        assert_eq!(table.get_cell("city", 0).unwrap(), &CellValue::text("Inc.\""));
        assert_eq!(parsed.recoveries.len(), 1);
    }

    #[test]
    fn normalizes_headers() {
        assert_eq!(normalize_header(" Unit Cost "), "unit_cost");
        assert_eq!(normalize_header("Lead Time Days"), "lead_time_days");
    }
}
