use std::time::Duration;

use anyhow::Context;

use crate::shopify::ShopifyConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub shopify: ShopifyConfig,
    /// Shared bearer token for the admin surface. `None` leaves it open.
    pub admin_token: Option<String>,
    pub upload_dir: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "5002".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            shopify: ShopifyConfig {
                shop_url: std::env::var("SHOPIFY_SHOP_URL")
                    .context("SHOPIFY_SHOP_URL must be set")?,
                access_token: std::env::var("SHOPIFY_ADMIN_TOKEN")
                    .context("SHOPIFY_ADMIN_TOKEN must be set")?,
                timeout: Duration::from_secs(
                    std::env::var("SHOPIFY_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "10".to_string())
                        .parse()
                        .context("SHOPIFY_TIMEOUT_SECS must be a valid number")?,
                ),
            },
            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
        })
    }
}
