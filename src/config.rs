use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// S3-compatible bucket used to mirror generated images.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// Azure OpenAI chat deployment plus the image generation endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub deployment: String,
    pub api_key: String,
    pub api_version: String,
    pub image_api_url: String,
    pub image_api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub api_key: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub stripe: StripeConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: env_or("JWT_ISSUER", "recipebox"),
            audience: env_or("JWT_AUDIENCE", "recipebox-users"),
            ttl_minutes: env_parse_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_parse_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let storage = StorageConfig {
            endpoint: env_or("MINIO_ENDPOINT", "http://localhost:9000"),
            bucket: env_or("MINIO_BUCKET", "recipes"),
            access_key: env_or("MINIO_ACCESS_KEY", "minioadmin"),
            secret_key: env_or("MINIO_SECRET_KEY", "minioadmin"),
            region: env_or("MINIO_REGION", "us-east-1"),
        };
        let generation = GenerationConfig {
            endpoint: std::env::var("AZURE_ENDPOINT")?,
            deployment: std::env::var("AZURE_DEPLOYMENT")?,
            api_key: std::env::var("AZURE_SUBSCRIPTION_KEY")?,
            api_version: env_or("AZURE_API_VERSION", "2024-10-21"),
            image_api_url: std::env::var("AZURE_IMAGE_API_URI")?,
            image_api_key: std::env::var("AZURE_IMAGE_API_KEY")?,
            timeout_secs: env_parse_or("GENERATION_TIMEOUT_SECS", 120),
        };
        let stripe = StripeConfig {
            api_key: std::env::var("STRIPE_API_KEY")?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")?,
            success_url: env_or("STRIPE_SUCCESS_URL", "https://example.com/success"),
            cancel_url: env_or("STRIPE_CANCEL_URL", "https://example.com/cancel"),
        };
        Ok(Self {
            database_url,
            jwt,
            storage,
            generation,
            stripe,
        })
    }
}
