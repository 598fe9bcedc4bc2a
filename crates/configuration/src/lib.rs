use config::builder::DefaultState;
use config::ConfigBuilder;
use std::env;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use settings::{
    AggregationConfig, Config, LoggingConfig, ServerConfig, SimulationConfig, StreamConfig,
    SuperTrendParams,
};

/// Loads the application configuration.
///
/// Sources are layered, later ones winning:
/// 1. built-in defaults,
/// 2. an optional `config.toml` in the working directory,
/// 3. `TRENDWATCH__SECTION__KEY` environment variables,
/// 4. the legacy `INTERVAL` and `TIME` variables for the kline interval and window size.
pub fn load_config() -> Result<Config, ConfigError> {
    // A missing .env is fine; the variables may come from the real environment.
    dotenvy::dotenv().ok();

    let builder = with_defaults(config::Config::builder())?
        .add_source(config::File::with_name("config").required(false));

    finish(with_environment(builder)?)
}

fn with_environment(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder
        .add_source(
            config::Environment::with_prefix("TRENDWATCH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("stream.interval", env::var("INTERVAL").ok())?
        .set_override_option("aggregation.time_interval", env::var("TIME").ok())?)
}

fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder
        .set_default("stream.base_url", "wss://fstream.binance.com")?
        .set_default("stream.interval", "1m")?
        .set_default("stream.reconnect_delay_ms", 1000_i64)?
        .set_default("stream.channel_capacity", 1024_i64)?
        .set_default("aggregation.time_interval", 1_i64)?
        .set_default("super_trend.atr_period", 10_i64)?
        .set_default("super_trend.atr_multiplier", "3")?
        .set_default("simulation.initial_balance", "100000")?
        .set_default("server.listen_addr", "0.0.0.0:3000")?
        .set_default("logging.level", "info")?
        .set_default("logging.directory", "logs")?
        .set_default("logging.file_prefix", "trendwatch.log")?)
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Config, ConfigError> {
    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.build()?.try_deserialize::<Config>()?;
    config.validate().map_err(ConfigError::ValidationError)?;
    tracing::debug!(?config, "Configuration loaded.");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use rust_decimal_macros::dec;

    fn from_toml(toml: &str) -> Result<Config, ConfigError> {
        let builder = with_defaults(config::Config::builder())?
            .add_source(config::File::from_str(toml, FileFormat::Toml));
        finish(builder)
    }

    #[test]
    fn built_in_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.stream.interval, "1m");
        assert_eq!(config.stream.reconnect_delay_ms, 1000);
        assert_eq!(config.super_trend.atr_period, 10);
        assert_eq!(config.super_trend.atr_multiplier, dec!(3));
        assert_eq!(config.simulation.initial_balance, dec!(100000));
        assert_eq!(config.aggregation.time_interval, 1);
    }

    #[test]
    fn file_values_override_defaults() {
        let config = from_toml(
            r#"
            [aggregation]
            time_interval = 3

            [super_trend]
            atr_period = 7
            atr_multiplier = 2.5
            "#,
        )
        .unwrap();
        assert_eq!(config.aggregation.time_interval, 3);
        assert_eq!(config.super_trend.atr_period, 7);
        assert_eq!(config.super_trend.atr_multiplier, dec!(2.5));
    }

    #[test]
    fn rejects_zero_period() {
        let err = from_toml("[super_trend]\natr_period = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn rejects_window_longer_than_an_hour() {
        let err = from_toml("[aggregation]\ntime_interval = 90\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn environment_overrides_file_values() {
        // Only this test touches the process environment.
        unsafe {
            env::set_var("TIME", "5");
            env::set_var("TRENDWATCH__SUPER_TREND__ATR_PERIOD", "7");
        }
        let builder = with_defaults(config::Config::builder())
            .unwrap()
            .add_source(config::File::from_str(
                "[aggregation]\ntime_interval = 3\n",
                FileFormat::Toml,
            ));
        let config = with_environment(builder).and_then(finish);
        unsafe {
            env::remove_var("TIME");
            env::remove_var("TRENDWATCH__SUPER_TREND__ATR_PERIOD");
        }

        let config = config.unwrap();
        assert_eq!(config.aggregation.time_interval, 5);
        assert_eq!(config.super_trend.atr_period, 7);
    }
}
