use anyhow::Result;
use std::env;
use std::time::Duration;

/// Outbound timeout applied to every X API call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/auth/x/callback";
const DEFAULT_AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
const DEFAULT_TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
const DEFAULT_API_BASE: &str = "https://api.twitter.com/2";

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Lambda or `APP_ENV=production|prod` means production
    pub fn detect() -> Self {
        if env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok() {
            return Self::Production;
        }

        match env::var("APP_ENV").as_deref() {
            Ok("production" | "prod") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// OAuth application credentials and X endpoints
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    /// Configuration pointing every X endpoint at `base_url` (mock servers)
    #[cfg(test)]
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            authorize_url: format!("{base_url}/i/oauth2/authorize"),
            token_url: format!("{base_url}/2/oauth2/token"),
            api_base: format!("{base_url}/2"),
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub database_url: String,
    pub provider: ProviderConfig,
    pub jwt_secret: String,
    pub session_expiration_hours: i64,
    pub enforce_session: bool,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    /// Loads configuration from the environment (and `.env` in development)
    pub fn from_env() -> Result<Self> {
        let environment = Environment::detect();

        tracing::info!(
            "🌍 Environment detected: {}",
            environment.as_str().to_uppercase()
        );

        Self::load_env_file(&environment);

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "x_bookmarks.db".to_string());
        let provider = Self::get_provider(&environment)?;
        let jwt_secret = Self::get_jwt_secret(&environment)?;
        let session_expiration_hours = env::var("SESSION_EXPIRATION_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(24);
        let enforce_session = env::var("SESSION_ENFORCE")
            .map(|v| Self::parse_bool(&v))
            .unwrap_or(true);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        if !enforce_session {
            tracing::warn!("⚠️  SESSION_ENFORCE disabled: API trusts the raw user_id parameter");
        }

        tracing::info!("✅ Configuration loaded successfully");
        tracing::debug!("   Database: {}", Self::mask_credentials(&database_url));
        tracing::debug!("   Redirect URI: {}", provider.redirect_uri);
        tracing::debug!("   X API: {}", provider.api_base);
        tracing::debug!("   Server: {}:{}", server_host, server_port);

        Ok(Self {
            environment,
            database_url,
            provider,
            jwt_secret,
            session_expiration_hours,
            enforce_session,
            server_host,
            server_port,
        })
    }

    /// In production the variables are injected by the platform
    fn load_env_file(environment: &Environment) {
        if environment.is_production() {
            tracing::info!("📦 Production mode: using injected environment variables");
            return;
        }

        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("   Loaded: {}", path.display()),
            Err(_) => tracing::warn!("   .env file not found, using environment variables"),
        }
    }

    fn get_provider(environment: &Environment) -> Result<ProviderConfig> {
        let client_id = Self::get_credential("CLIENT_ID", environment)?;
        let client_secret = Self::get_credential("CLIENT_SECRET", environment)?;

        Ok(ProviderConfig {
            client_id,
            client_secret,
            redirect_uri: env::var("REDIRECT_URI").unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string()),
            authorize_url: env::var("X_AUTHORIZE_URL")
                .unwrap_or_else(|_| DEFAULT_AUTHORIZE_URL.to_string()),
            token_url: env::var("X_TOKEN_URL").unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
            api_base: env::var("X_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    fn get_credential(name: &str, environment: &Environment) -> Result<String> {
        match env::var(name) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ if environment.is_production() => {
                tracing::error!("❌ {name} not set in production!");
                anyhow::bail!("{name} is required in production");
            }
            _ => {
                tracing::warn!("⚠️  {name} not set, X login will fail (DEVELOPMENT ONLY!)");
                Ok(String::new())
            }
        }
    }

    fn get_jwt_secret(environment: &Environment) -> Result<String> {
        let secret = match env::var("JWT_SECRET") {
            Ok(s) => s,
            Err(_) if environment.is_production() => {
                tracing::error!("❌ JWT_SECRET not set in production!");
                anyhow::bail!("JWT_SECRET is required in production");
            }
            Err(_) => {
                tracing::warn!("⚠️  JWT_SECRET not set, using default (DEVELOPMENT ONLY!)");
                "dev_secret_key_change_in_production".to_string()
            }
        };

        if environment.is_production() && secret.len() < 32 {
            anyhow::bail!(
                "JWT_SECRET must be at least 32 characters in production (current: {})",
                secret.len()
            );
        }

        Ok(secret)
    }

    fn parse_bool(value: &str) -> bool {
        !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        )
    }

    /// Masks credentials embedded in a connection URL
    fn mask_credentials(url: &str) -> String {
        if let Some(at_pos) = url.find('@')
            && let Some(scheme_end) = url.find("://")
        {
            let scheme = &url[..scheme_end + 3];
            let after_at = &url[at_pos..];
            return format!("{scheme}***:***{after_at}");
        }
        url.to_string()
    }

    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }
}
