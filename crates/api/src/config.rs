//! Process configuration read from the environment (and `.env`, if present).

use std::env;
use std::str::FromStr;

use anyhow::{Context, anyhow};

use catalog_infra::numbering;
use catalog_infra::settings::ProductSettings;
use catalog_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Postgres connection string; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub log_format: LogFormat,
    pub products: ProductSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            log_format: LogFormat::default(),
            products: ProductSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        let mut products = defaults.products;

        if let Some(id) = parse(&var, "PRODUCTS_DEFAULT_BASE_UNIT_ID")? {
            products.default_base_unit_id = id;
        }
        if let Some(id) = parse(&var, "PRODUCTS_DEFAULT_WEIGHT_UNIT_ID")? {
            products.default_weight_unit_id = Some(id);
        }
        if let Some(id) = parse(&var, "PRODUCTS_DEFAULT_SIZE_UNIT_ID")? {
            products.default_size_unit_id = Some(id);
        }
        if let Some(has_weight) = parse(&var, "PRODUCTS_DEFAULT_HAS_WEIGHT")? {
            products.has_weight = has_weight;
        }
        if let Some(has_size) = parse(&var, "PRODUCTS_DEFAULT_HAS_SIZE")? {
            products.has_size = has_size;
        }
        if let Some(id) = parse(&var, "PRODUCTS_SALES_TAX_RATE_ID")? {
            products.default_sales_tax_rate_id = id;
        }
        if let Some(id) = parse(&var, "PRODUCTS_PURCHASE_TAX_RATE_ID")? {
            products.default_purchase_tax_rate_id = id;
        }
        if let Some(template) = var("PRODUCTS_CODE_TEMPLATE") {
            numbering::validate_template(&template).context("PRODUCTS_CODE_TEMPLATE")?;
            products.code_template = template;
        }

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: var("DATABASE_URL"),
            database_max_connections: parse(&var, "DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database_max_connections),
            log_format: parse(&var, "LOG_FORMAT")?.unwrap_or(defaults.log_format),
            products,
        })
    }
}

fn parse<T>(var: impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|raw| raw.trim().parse::<T>().map_err(|e| anyhow!("{name}: {e}")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use catalog_infra::HasWeightBehaviour;
    use catalog_infra::store::seed;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert!(config.database_url.is_none());
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.products, ProductSettings::default());
    }

    #[test]
    fn product_settings_are_read() {
        let kilogram = seed::KILOGRAM.to_string();
        let config = config(&[
            ("PRODUCTS_DEFAULT_BASE_UNIT_ID", kilogram.as_str()),
            ("PRODUCTS_DEFAULT_HAS_WEIGHT", "true_if_weighted"),
            ("PRODUCTS_DEFAULT_HAS_SIZE", "true"),
            ("PRODUCTS_CODE_TEMPLATE", "P/{yyyy}/{seq:4}"),
            ("LOG_FORMAT", "pretty"),
            ("DATABASE_URL", "  "),
        ])
        .unwrap();
        assert_eq!(config.products.default_base_unit_id, seed::KILOGRAM);
        assert_eq!(config.products.has_weight, HasWeightBehaviour::TrueIfWeighted);
        assert!(config.products.has_size);
        assert_eq!(config.products.code_template, "P/{yyyy}/{seq:4}");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = config(&[("PRODUCTS_DEFAULT_SIZE_UNIT_ID", "nope")]).unwrap_err();
        assert!(err.to_string().contains("PRODUCTS_DEFAULT_SIZE_UNIT_ID"));

        let err = config(&[("PRODUCTS_CODE_TEMPLATE", "PRD/")]).unwrap_err();
        assert!(err.to_string().contains("PRODUCTS_CODE_TEMPLATE"));

        let overlong = format!("{}/{{seq}}", "P".repeat(250));
        let err = config(&[("PRODUCTS_CODE_TEMPLATE", overlong.as_str())]).unwrap_err();
        assert!(err.to_string().contains("PRODUCTS_CODE_TEMPLATE"));
    }
}
