use anyhow::Result;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table,
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_BORDERS_ONLY,
};

use crate::history::{Action, HistoryStore};

/// Prints the recorded query history as a table on stdout.
pub async fn run(store: &HistoryStore) -> Result<()> {
    let records = store.load().await?;

    if records.is_empty() {
        println!("No queries recorded yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Coin").add_attribute(Attribute::Bold),
            Cell::new("Queried At (UTC)").add_attribute(Attribute::Bold),
            Cell::new("Latest")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("5-Sample Avg")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("Action").add_attribute(Attribute::Bold),
        ]);

    for record in &records {
        let avg_str = record
            .avg_5
            .map(|avg| format!("{avg:.2}"))
            .unwrap_or_else(|| "N/A".to_string());

        let action_cell = match record.action {
            Action::Buy => Cell::new("buy").fg(Color::Green),
            Action::Sell => Cell::new("sell").fg(Color::Red),
        };

        table.add_row(vec![
            Cell::new(&record.coin).fg(Color::Cyan),
            Cell::new(record.queried_at.format("%d-%m-%Y %H:%M:%S").to_string())
                .fg(Color::DarkGrey),
            Cell::new(format!("{:.2}", record.latest_price)).set_alignment(CellAlignment::Right),
            Cell::new(avg_str).set_alignment(CellAlignment::Right),
            action_cell,
        ]);
    }

    let title = format!("({} queries recorded)", records.len());
    println!("\n{}\n{}", title, table);

    Ok(())
}
