use fuel_tools::{CacheStatus, FuelClient, Identifier};
use std::error::Error;

#[async_std::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let client = FuelClient::from_env()?;
    let model_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://api.ignitionfuel.org/1.0/caguero/models/Beer".to_string());

    println!("--- Cache check ---");
    match client.cached_model(&model_url)? {
        CacheStatus::AlreadyExists(path) => println!("Already cached at: {:?}", path),
        CacheStatus::NotCached => {
            println!("Not cached, downloading {}", model_url);
            let path = client.download_model_url(&model_url).await?;
            println!("Model ready at: {:?}", path);
        }
    }

    println!("\n--- Details ---");
    let id = client.parse_model_url(&model_url)?;
    match client.model_details(&id).await {
        Ok(details) => println!(
            "{}: {}",
            details,
            details.description.as_deref().unwrap_or("(no description)")
        ),
        Err(e) => eprintln!("Could not fetch details: {}", e),
    }

    println!("\n--- Models by {} ---", id.owner);
    for model in client.models_matching(&Identifier::owned_by(&id.owner)).await? {
        println!("{}", model);
    }

    Ok(())
}
