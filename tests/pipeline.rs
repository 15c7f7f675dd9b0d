use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use invopt::domain::InvError;
use invopt::loader::load_data_file;
use invopt::parser::parse_csv;
use invopt::rows::{Row, RowId};
use invopt::serializer::{escape_field, rows_to_csv, table_to_csv};
use invopt::table::{Column, Table};
use invopt::value::CellValue;
use invopt::view::{SortKey, ViewQuery, apply, filter_and_sort};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn ids(rows: &[Row]) -> Vec<String> {
    rows.iter().map(|r| r.id.to_string()).collect()
}

#[test]
fn scenario_small_inventory() {
    let parsed = parse_csv("product_id,name,stock\nA001,Widget A,150\nA002,Widget B,300\n").unwrap();
    let table = parsed.table;
    assert_eq!(table.column_names(), vec!["product_id", "name", "stock"]);
    assert_eq!(table.row_count(), 2);
    assert_eq!(
        table.column("stock").unwrap().values,
        vec![CellValue::Number(150.0), CellValue::Number(300.0)]
    );
    assert!(parsed.recoveries.is_empty());
}

#[test]
fn scenario_set_cell_coerces() {
    let mut table = parse_csv("product_id,name,stock\nA001,Widget A,150\nA002,Widget B,300\n")
        .unwrap()
        .table;
    assert_eq!(table.set_cell("stock", 0, "75").unwrap(), &CellValue::Number(75.0));
    assert_eq!(table.row_count(), 2);
    assert!(matches!(
        table.set_cell("stock", 2, "1"),
        Err(InvError::OutOfRange(_))
    ));
}

#[test]
fn scenario_comma_in_text_is_quoted() {
    assert_eq!(escape_field("Acme, Inc."), "\"Acme, Inc.\"");
    let table = Table::from_columns(vec![
        Column::new("supplier", vec![CellValue::text("Acme, Inc.")]),
        Column::new("qty", vec![CellValue::Number(3.0)]),
    ])
    .unwrap();
    assert_eq!(table_to_csv(&table), "supplier,qty\n\"Acme, Inc.\",3\n");
}

#[test]
fn scenario_descending_reverses_ties() {
    let rows = parse_csv("id,cost\n1,10\n2,10\n3,5\n").unwrap().table.snapshot();
    let asc = filter_and_sort(&rows, &ViewQuery::default().with_sort(SortKey::ascending("cost"))).unwrap();
    assert_eq!(ids(&asc), vec!["3", "1", "2"]);
    let desc =
        filter_and_sort(&rows, &ViewQuery::default().with_sort(SortKey::descending("cost"))).unwrap();
    assert_eq!(ids(&desc), vec!["2", "1", "3"]);
}

#[test]
fn fixture_round_trips_with_numbers_rerendered() {
    let loaded = load_data_file(&fixture("inventory.csv")).unwrap();
    assert_eq!(loaded.name, "inventory.csv");
    assert_eq!(loaded.table.row_count(), 5);
    assert_eq!(loaded.table.column_count(), 6);

    let original = fs::read_to_string(fixture("inventory.csv")).unwrap();
    let expected = original
        .replace("20.50", "20.5")
        .replace("35.20", "35.2")
        .replace("12.30", "12.3");
    assert_eq!(table_to_csv(&loaded.table), expected);
}

#[test]
fn fixture_rows_without_id_column_get_synthetic_ids() {
    let table = load_data_file(&fixture("inventory.csv")).unwrap().table;
    let rows = table.snapshot();
    assert_eq!(rows.rows()[0].id, RowId::Synthetic(1));
    assert_eq!(rows.rows()[4].id, RowId::Synthetic(5));
}

#[test]
fn fixture_filter_sort_and_export() {
    let table = load_data_file(&fixture("inventory.csv")).unwrap().table;
    let query = ViewQuery::default()
        .with_filter("widget")
        .with_sort(SortKey::descending("current_stock"));
    let rows = filter_and_sort(&table.snapshot(), &query).unwrap();
    let header: Vec<String> = table.column_names().iter().map(|s| s.to_string()).collect();
    assert_eq!(
        rows_to_csv(&header, &rows),
        "product_id,name,current_stock,unit_cost,lead_time_days,daily_demand\n\
         A002,Widget B,300,15.75,7,25\n\
         A001,Widget A,150,20.5,5,12\n\
         A003,Widget C,75,35.2,3,8\n"
    );
}

#[test]
fn ragged_lines_are_recovered() {
    let loaded = load_data_file(&fixture("ragged.csv")).unwrap();
    let table = loaded.table;
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.get_cell("current_stock", 1).unwrap(), &CellValue::Empty);
    assert_eq!(table.get_cell("current_stock", 2).unwrap(), &CellValue::Number(75.0));
    let recovered: Vec<(usize, bool)> = loaded
        .recoveries
        .iter()
        .map(|r| (r.line, r.padded()))
        .collect();
    assert_eq!(recovered, vec![(4, true), (5, false)]);
}

#[test]
fn unknown_extension_and_missing_file_are_rejected() {
    assert!(matches!(
        load_data_file(&fixture("inventory.txt")),
        Err(InvError::FileNotFound(_)) | Err(InvError::UnknownFileType(_))
    ));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "a,b\n1,2\n").unwrap();
    assert!(matches!(load_data_file(&path), Err(InvError::UnknownFileType(_))));
}

/// Some text cell holds the term in any case, or some number renders with it.
fn contains_term(row: &Row, term: &str) -> bool {
    let lowered = term.to_lowercase();
    term.is_empty()
        || row.values().iter().any(|value| match value {
            CellValue::Text(text) => text.to_lowercase().contains(&lowered),
            CellValue::Number(_) => value.render().contains(term),
            CellValue::Bool(_) | CellValue::Empty => false,
        })
}

fn cell_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9 ]{0,6}[a-z]",
        (-100_000i64..100_000).prop_map(|n| n.to_string()),
    ]
}

fn csv_strategy() -> impl Strategy<Value = (usize, String)> {
    (1usize..5).prop_flat_map(|ncols| {
        prop::collection::vec(prop::collection::vec(cell_strategy(), ncols), 1..12).prop_map(
            move |rows| {
                let header: Vec<String> = (0..ncols).map(|c| format!("c{c}")).collect();
                let mut text = header.join(",");
                text.push('\n');
                for row in &rows {
                    text.push_str(&row.join(","));
                    text.push('\n');
                }
                (rows.len(), text)
            },
        )
    })
}

proptest! {
    #[test]
    fn serialize_after_parse_reproduces_plain_csv((_, text) in csv_strategy()) {
        let table = parse_csv(&text).unwrap().table;
        prop_assert_eq!(table_to_csv(&table), text);
    }

    #[test]
    fn every_column_has_row_count_values(
        (nrows, text) in csv_strategy(),
        edits in prop::collection::vec((0usize..16, cell_strategy()), 0..8),
    ) {
        let mut table = parse_csv(&text).unwrap().table;
        prop_assert_eq!(table.row_count(), nrows);
        for (row, raw) in edits {
            let _ = table.set_cell("c0", row, &raw);
        }
        for column in table.columns() {
            prop_assert_eq!(column.len(), nrows);
        }
    }

    #[test]
    fn filtered_rows_contain_the_term((_, text) in csv_strategy(), term in "[a-z0-9]{0,2}") {
        let rows = parse_csv(&text).unwrap().table.snapshot();
        let matched = filter_and_sort(&rows, &ViewQuery::default().with_filter(term.clone())).unwrap();
        for row in &matched {
            prop_assert!(contains_term(row, &term));
        }
        let expected: Vec<usize> = rows
            .rows()
            .iter()
            .filter(|r| contains_term(r, &term))
            .map(|r| r.index)
            .collect();
        let found: Vec<usize> = matched.iter().map(|r| r.index).collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn pages_cover_the_filtered_rows(
        (_, text) in csv_strategy(),
        page_size in 1usize..6,
        term in "[a-z]{0,1}",
    ) {
        let rows = parse_csv(&text).unwrap().table.snapshot();
        let query = ViewQuery::default()
            .with_filter(term)
            .with_sort(SortKey::ascending("c0"));
        let all = filter_and_sort(&rows, &query).unwrap();
        let first = apply(&rows, &query.clone().with_page(0, page_size)).unwrap();
        let mut paged = Vec::new();
        for page in 0..first.page_count(page_size) {
            let result = apply(&rows, &query.clone().with_page(page, page_size)).unwrap();
            prop_assert!(result.rows.len() <= page_size);
            paged.extend(result.rows);
        }
        prop_assert_eq!(paged, all);
    }

    #[test]
    fn sorting_twice_changes_nothing((_, text) in csv_strategy(), descending in any::<bool>()) {
        let rows = parse_csv(&text).unwrap().table.snapshot();
        let key = if descending { SortKey::descending("c0") } else { SortKey::ascending("c0") };
        let query = ViewQuery::default().with_sort(SortKey::ascending("c0"));
        let once = filter_and_sort(&rows, &query).unwrap();
        let twice = filter_and_sort(
            &invopt::rows::RowSet::new(rows.shared_header(), once.clone()),
            &query,
        )
        .unwrap();
        prop_assert_eq!(&once, &twice);

        let reversed = filter_and_sort(&rows, &ViewQuery::default().with_sort(key.clone())).unwrap();
        if descending {
            let mut expected = once.clone();
            expected.reverse();
            prop_assert_eq!(reversed, expected);
        } else {
            prop_assert_eq!(reversed, once);
        }
    }
}
