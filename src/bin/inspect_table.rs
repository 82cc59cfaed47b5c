use anyhow::{bail, Result};
use clap::Parser;
use votescraper::{
    config::FetchConfig,
    fetch::Fetcher,
    table::{
        html::{locate_table, split_anchor, RowSelection, TableLocator},
        CellGrid,
    },
};

/// Print the table a `location#anchor` resolves to, with row and cell indices,
/// for working out a jurisdiction's extraction settings.
#[derive(Parser, Debug)]
struct Args {
    /// URL or local HTML file, with the `#section` anchor
    location: String,

    /// Look inside the anchor's next sibling instead of the following tables
    #[arg(long)]
    next_wrapped: bool,

    /// Keep heading rows as well
    #[arg(long)]
    all_rows: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (doc, anchor) = split_anchor(&args.location);
    let Some(anchor) = anchor else {
        bail!("{} has no #anchor", args.location);
    };

    let text = Fetcher::new(&FetchConfig::default())?.read_text(doc).await?;
    let locator = if args.next_wrapped {
        TableLocator::NextWrapped
    } else {
        TableLocator::FollowingTable
    };
    let rows = if args.all_rows {
        RowSelection::AllRows
    } else {
        RowSelection::DataRows
    };
    let table = locate_table(&text, anchor, locator, rows)?;

    println!("=== {} rows under #{} ===", table.row_count(), anchor);
    for row in 0..table.row_count() {
        let cells: Vec<String> = (0..table.cell_count(row))
            .map(|col| format!("[{}] {}", col, table.cell(row, col).unwrap_or("")))
            .collect();
        println!("{:>4}: {}", row, cells.join(" | "));
    }
    Ok(())
}
