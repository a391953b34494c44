use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub identifier: IdentifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierConfig {
    /// SNOMED namespace identifier used when generating long-format SCTIDs.
    /// Zero selects short-format (International core) identifiers.
    pub namespace: u32,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self { namespace: 0 }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional `config` file and
    /// `SNOWSTORM_`-prefixed environment variables.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);
        config = config.add_source(config::File::with_name("config").required(false));
        config = config.add_source(
            config::Environment::with_prefix("SNOWSTORM")
                .separator("_")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_the_core_namespace() {
        let config = AppConfig::default();
        assert_eq!(config.identifier.namespace, 0);
    }
}
