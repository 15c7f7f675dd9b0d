use crate::rows::Row;
use crate::table::Table;
use crate::value::CellValue;

/// Quotes a field that contains `,` or `"`, doubling inner quotes.
pub fn escape_field(text: &str) -> String {
    if text.contains(|c: char| c == ',' || c == '"') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn render_line<'a>(cells: impl Iterator<Item = &'a CellValue>) -> String {
    cells
        .map(|v| escape_field(&v.render()))
        .collect::<Vec<String>>()
        .join(",")
}

/// Serializes a whole table. Every line, the last one included, ends with `\n`.
pub fn table_to_csv(table: &Table) -> String {
    let mut out = table.column_names().join(",");
    out.push('\n');
    for row in 0..table.row_count() {
        out.push_str(&render_line(table.columns().iter().map(|c| &c.values[row])));
        out.push('\n');
    }
    out
}

/// Serializes a row snapshot (for example a filtered and sorted view) under `header`.
pub fn rows_to_csv(header: &[String], rows: &[Row]) -> String {
    let mut out = header.join(",");
    out.push('\n');
    for row in rows {
        out.push_str(&row_to_csv_line(row));
        out.push('\n');
    }
    out
}

/// A single row as one CSV line without the line terminator.
pub fn row_to_csv_line(row: &Row) -> String {
    render_line(row.values().iter())
}
