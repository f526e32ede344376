//! `naturalmaps onboard` — First-time setup.

use naturalmaps_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("naturalmaps — First-Time Setup");
    println!("==============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("   1. Edit {} or export OPENAI_API_KEY", config_path.display());
        println!("   2. Run: naturalmaps ask \"Where are the public swimming pools in Neukölln?\"\n");
    }

    let config = AppConfig::load_from(&config_path)?;
    println!("Runs will be logged to: {}\n", config.run_log.path().display());

    Ok(())
}
