//! Tips command - Advice for writing search queries

use anyhow::Result;

use crate::GlobalOptions;

const SEARCH_TIPS: &[&str] = &[
    "Use descriptive terms like colors, styles, or occasions",
    "Try different variations: \"formal shirt\" vs \"dress shirt\"",
    "Combine attributes: \"red summer dress\"",
    "Search by material: \"cotton t-shirt\"",
];

const HOW_IT_WORKS: &str = "prodsearch uses semantic search to understand the meaning \
behind your query and find the most relevant products based on their descriptions.";

/// Execute the tips command
pub fn execute(global: GlobalOptions) -> Result<()> {
    println!("Search Tips");
    println!("===========\n");
    for tip in SEARCH_TIPS {
        println!("  - {}", tip);
    }

    if !global.quiet {
        println!("\nHow it works");
        println!("============\n");
        println!("{}", HOW_IT_WORKS);
    }
    Ok(())
}
