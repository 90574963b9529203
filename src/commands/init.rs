use std::io::{self, Write};

use crate::config::{Config, DEFAULT_SOURCE_URL};
use crate::error::{AppError, Result};

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

pub async fn run() -> Result<()> {
    let config_path = Config::config_path()?;

    if config_path.exists() {
        let answer = prompt(&format!(
            "Config file already exists at {}. Overwrite? [y/N] ",
            config_path.display()
        ))?;

        if !answer.eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    println!("User Dispatcher Configuration");
    println!("=============================\n");

    let target_url = prompt("Enter the destination URL to POST users to: ")?;
    if target_url.is_empty() {
        return Err(AppError::MissingTargetUrl);
    }
    url::Url::parse(&target_url).map_err(|e| AppError::InvalidUrl {
        url: target_url.clone(),
        source: e,
    })?;

    let source_url = prompt(&format!("Enter the source URL [{DEFAULT_SOURCE_URL}]: "))?;

    let config = Config {
        source_url: (!source_url.is_empty()).then_some(source_url),
        target_url: Some(target_url),
        ..Config::default()
    };

    // Create config directory if it doesn't exist
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AppError::ConfigRead {
            path: config_path.clone(),
            source: e,
        })?;
    }

    std::fs::write(&config_path, toml::to_string(&config)?).map_err(|e| {
        AppError::ConfigRead {
            path: config_path.clone(),
            source: e,
        }
    })?;

    println!("\nConfig saved to {}", config_path.display());
    println!("You can now use 'user-dispatcher run'!");

    Ok(())
}
