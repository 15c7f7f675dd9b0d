//! Built-in sample data, used when no service is reachable.

use chrono::Utc;

use crate::backend::{OptimizationResult, OptimizationSummary};
use crate::table::{Column, Table};
use crate::value::CellValue;

fn column<V: Into<CellValue> + Copy>(name: &str, values: &[V]) -> Column {
    Column::new(name, values.iter().map(|v| (*v).into()).collect())
}

fn build(columns: Vec<Column>) -> Table {
    match Table::from_columns(columns) {
        Ok(table) => table,
        Err(e) => unreachable!("demo table is well formed: {e}"),
    }
}

const PRODUCT_IDS: [&str; 5] = ["A001", "A002", "A003", "B001", "B002"];
const NAMES: [&str; 5] = ["Widget A", "Widget B", "Widget C", "Product D", "Product E"];
const CURRENT_STOCK: [i64; 5] = [150, 300, 75, 120, 200];

pub const DEMO_INVENTORY_NAME: &str = "inventory_data_demo.csv";
pub const DEMO_OUTPUT_FILE: &str = "optimization_results_demo.csv";

pub fn inventory() -> Table {
    build(vec![
        column("product_id", &PRODUCT_IDS),
        column("name", &NAMES),
        column("current_stock", &CURRENT_STOCK),
        column("unit_cost", &[20.50, 15.75, 35.20, 12.30, 8.45]),
        column("lead_time_days", &[5i64, 7, 3, 10, 4]),
        column("daily_demand", &[12i64, 25, 8, 15, 30]),
    ])
}

pub fn optimization_results() -> OptimizationResult {
    let data = build(vec![
        column("product_id", &PRODUCT_IDS),
        column("name", &NAMES),
        column("current_stock", &CURRENT_STOCK),
        column("optimal_stock", &[120i64, 250, 60, 95, 160]),
        column("reorder_point", &[40i64, 75, 20, 30, 50]),
        column("economic_order_qty", &[60i64, 120, 30, 45, 80]),
        column("cost_savings", &[450.75, 315.25, 340.50, 228.75, 225.50]),
        column("stock_reduction_pct", &[20.0, 16.7, 20.0, 20.8, 20.0]),
    ]);
    OptimizationResult {
        message: "Optimization completed successfully".to_string(),
        summary: OptimizationSummary {
            total_savings: 1560.75,
            average_stock_reduction: 20.5,
            optimization_date: Utc::now(),
        },
        data,
        output_file: DEMO_OUTPUT_FILE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_tables_have_five_products() {
        let inventory = inventory();
        assert_eq!(inventory.row_count(), 5);
        assert_eq!(inventory.column_count(), 6);
        assert_eq!(inventory.get_cell("unit_cost", 0).unwrap(), &CellValue::Number(20.5));

        let results = optimization_results();
        assert_eq!(results.data.row_count(), 5);
        assert_eq!(results.data.column_count(), 8);
        assert_eq!(results.output_file, DEMO_OUTPUT_FILE);
    }
}
