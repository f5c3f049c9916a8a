use std::env;

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub object_store_root: String,
    pub findings_endpoint: String,
    pub invoked_function_arn: String,
    pub invocation_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            object_store_root: env::var("OBJECT_STORE_ROOT")
                .unwrap_or_else(|_| "./objects".to_string()),
            findings_endpoint: env::var("FINDINGS_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4566".to_string()),
            invoked_function_arn: env::var("INVOKED_FUNCTION_ARN")?,
            invocation_timeout_secs: env::var("INVOCATION_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
        })
    }
}
