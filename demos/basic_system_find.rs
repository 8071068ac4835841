//! Runs `system.find` on one ePO server and pretty-prints the JSON result.
//!
//! ```text
//! cargo run --example basic_system_find -- <config-dir> <epo-unique-id> <search-text>
//! ```

use std::error::Error;
use std::time::Duration;

use epo_remote_bridge::config::ServiceConfig;
use epo_remote_bridge::fabric::InMemoryFabric;
use epo_remote_bridge::{logging, request_topic, EpoService};
use serde_json::{json, Value};

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let usage = "Usage: basic_system_find <config-dir> <epo-unique-id> <search-text>";
    let config_dir = args.next().ok_or(usage)?;
    let unique_id = args.next().ok_or(usage)?;
    let search_text = args.next().ok_or(usage)?;

    let config = ServiceConfig::load(&config_dir)?;
    logging::init(config.logging.filter.as_deref());

    let fabric = InMemoryFabric::new(config.fabric.clone());
    let service = EpoService::new(&config_dir, fabric.clone());
    service.start()?;

    let payload = json!({
        "command": "system.find",
        "output": "json",
        "params": { "searchText": search_text }
    });
    let response = fabric.request(
        &request_topic(&unique_id),
        payload.to_string(),
        Duration::from_secs(30),
    )?;

    match response.payload() {
        Some(body) => {
            let systems: Value = serde_json::from_slice(body)?;
            println!("{}", serde_json::to_string_pretty(&systems)?);
        }
        None => println!(
            "Error: {} ({})",
            response.error_message().unwrap_or_default(),
            response.error_code().unwrap_or_default()
        ),
    }

    service.stop()?;
    Ok(())
}
