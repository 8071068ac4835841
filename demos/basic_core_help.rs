//! Lists the remote commands of every configured ePO server.
//!
//! ```text
//! cargo run --example basic_core_help -- <config-dir>
//! ```

use std::error::Error;
use std::time::Duration;

use epo_remote_bridge::config::ServiceConfig;
use epo_remote_bridge::fabric::InMemoryFabric;
use epo_remote_bridge::{logging, EpoService};

fn main() -> Result<(), Box<dyn Error>> {
    let config_dir = std::env::args()
        .nth(1)
        .ok_or("Usage: basic_core_help <configuration files directory>")?;

    let config = ServiceConfig::load(&config_dir)?;
    logging::init(config.logging.filter.as_deref());

    let fabric = InMemoryFabric::new(config.fabric.clone());
    let service = EpoService::new(&config_dir, fabric.clone());
    service.start()?;

    for topic in service.topics() {
        let response = fabric.request(
            &topic,
            r#"{"command":"core.help","output":"verbose"}"#,
            Duration::from_secs(30),
        )?;
        println!("== {}", topic);
        match response.payload_str() {
            Some(help) => println!("{}", help),
            None => println!(
                "Error: {} ({})",
                response.error_message().unwrap_or_default(),
                response.error_code().unwrap_or_default()
            ),
        }
    }

    service.stop()?;
    Ok(())
}
