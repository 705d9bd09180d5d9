use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub cors_origin: String,
    pub port: u16,
    pub default_radius_km: f64,
    pub max_radius_km: f64,
}

impl Config {
    pub fn load() -> Result<Self, String> {
        let config = Self {
            database_url: load_or("DATABASE_URL", "urbalert.db"),
            jwt_secret: load_or("JWT_SECRET", "dev-secret-change-me"),
            cors_origin: load_or("CORS_ORIGIN", "http://localhost:3000"),
            port: try_load("PORT", "8080")?,
            default_radius_km: try_load("DEFAULT_RADIUS_KM", "5")?,
            max_radius_km: try_load("MAX_RADIUS_KM", "50")?,
        };

        if !(config.default_radius_km > 0.0 && config.default_radius_km <= config.max_radius_km) {
            return Err(format!(
                "DEFAULT_RADIUS_KM must be in (0, {}], got {}",
                config.max_radius_km, config.default_radius_km
            ));
        }

        Ok(config)
    }
}

fn load_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        warn!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, String>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse_var(key, &raw)
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T, String>
where
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("Invalid {key} value `{raw}`: {e}"))
}

#[cfg(test)]
mod tests {
    use super::parse_var;

    #[test]
    fn parses_numbers_with_whitespace() {
        assert_eq!(parse_var::<u16>("PORT", " 9000 "), Ok(9000));
        assert_eq!(parse_var::<f64>("MAX_RADIUS_KM", "12.5"), Ok(12.5));
    }

    #[test]
    fn reports_the_offending_variable() {
        let err = parse_var::<u16>("PORT", "eighty").unwrap_err();
        assert!(err.starts_with("Invalid PORT value `eighty`"));
    }
}
