use anyhow::{Result, bail};

use crate::ai::Provider;
use crate::client::{FileSettingsStore, ProviderConfig, SettingsStore};

pub fn run(provider: Option<String>, credential: Option<String>) -> Result<()> {
    let store = FileSettingsStore::new(FileSettingsStore::default_path()?);
    let current = store.load()?;

    if provider.is_none() && credential.is_none() {
        print_settings(&current);
        return Ok(());
    }

    let provider = match provider {
        Some(name) => match name.parse::<Provider>() {
            Ok(p) => p,
            Err(_) => bail!(
                "Unknown provider {}. Choose one of: {}",
                name,
                Provider::ALL.map(|p| p.as_str()).join(", ")
            ),
        },
        None => current.provider,
    };
    // Switching provider without a new credential starts from a blank
    // one, a key for one vendor is never valid for another
    let credential = match credential {
        Some(c) => c,
        None if provider == current.provider => current.credential.clone(),
        None => String::new(),
    };

    let config = ProviderConfig::new(provider, &credential);
    store.save(&config)?;
    println!("Saved to {}", store.path().display());
    print_settings(&config);
    Ok(())
}

fn print_settings(config: &ProviderConfig) {
    println!("provider:   {} ({})", config.provider, config.provider.model_id());
    let credential = match (config.credential(), config.provider.requires_api_key()) {
        (Some(_), true) => "set",
        (None, true) => "missing",
        (Some(url), false) => url,
        (None, false) => "default base URL",
    };
    println!("credential: {}", credential);
}
