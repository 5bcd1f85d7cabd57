use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub payments: PaymentConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub default_currency: String,
    pub stripe: StripeConfig,
    pub razorpay: RazorpayConfig,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory of the private attachment disk.
    pub attachment_root: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        Ok(Self {
            port,
            database_url,
            host,
            payments: PaymentConfig::from_env(),
            storage: StorageConfig::from_env(),
        })
    }
}

impl PaymentConfig {
    pub fn from_env() -> Self {
        Self {
            default_currency: env::var("PAYMENT_DEFAULT_CURRENCY")
                .unwrap_or_else(|_| "USD".to_string()),
            stripe: StripeConfig {
                secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
                success_url: env::var("STRIPE_SUCCESS_URL")
                    .unwrap_or_else(|_| "http://localhost:3000/purchases/success".to_string()),
                cancel_url: env::var("STRIPE_CANCEL_URL")
                    .unwrap_or_else(|_| "http://localhost:3000/purchases/cancel".to_string()),
            },
            razorpay: RazorpayConfig {
                key_id: env::var("RAZORPAY_KEY_ID").unwrap_or_default(),
                key_secret: env::var("RAZORPAY_KEY_SECRET").unwrap_or_default(),
                webhook_secret: env::var("RAZORPAY_WEBHOOK_SECRET").unwrap_or_default(),
            },
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            attachment_root: env::var("ATTACHMENT_ROOT")
                .unwrap_or_else(|_| "storage/private".to_string()),
        }
    }
}
