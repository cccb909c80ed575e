use std::env;

use nutrifind::{AppConfig, FoodResolver};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let usage = "Usage: nutrifind <query> [limit] | nutrifind --barcode <code>";

    let config = AppConfig::load()?;
    let resolver = FoodResolver::from_config(&config).await?;

    match args.get(1).map(String::as_str) {
        Some("--barcode") => {
            let code = args.get(2).ok_or(usage)?;
            match resolver.resolve_by_barcode(code).await {
                Some(product) => println!("{}", serde_json::to_string_pretty(&product)?),
                None => println!("No product found for barcode {code}"),
            }
        }
        Some(query) => {
            let limit = args
                .get(2)
                .and_then(|v| v.parse().ok())
                .unwrap_or(config.api.max_results);
            let results = resolver.resolve(query, limit).await;
            if results.is_empty() {
                println!("No products found for {query:?}");
            } else {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
        }
        None => return Err(usage.into()),
    }

    Ok(())
}
