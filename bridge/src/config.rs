use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Testnet => "testnet",
            Self::Mainnet => "mainnet",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "testnet" => Some(Self::Testnet),
            "mainnet" => Some(Self::Mainnet),
            _ => None,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub testnet_key: Option<String>,
    pub mainnet_key: Option<String>,
    pub mongo_url: String,
    pub db_name: String,
    pub api_port: u16,
    pub lock_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = match std::env::var("ENVIRONMENT") {
            Ok(val) => Environment::parse(&val).ok_or_else(|| {
                anyhow::anyhow!("ENVIRONMENT must be 'testnet' or 'mainnet', got '{val}'")
            })?,
            Err(_) => Environment::Testnet,
        };

        let config = Self {
            environment,
            testnet_key: std::env::var("HYPERLIQUID_TESTNET_KEY").ok(),
            mainnet_key: std::env::var("HYPERLIQUID_MAINNET_KEY").ok(),
            mongo_url: std::env::var("MONGO_URL")
                .map_err(|_| anyhow::anyhow!("MONGO_URL is required"))?,
            db_name: std::env::var("DB_NAME")
                .map_err(|_| anyhow::anyhow!("DB_NAME is required"))?,
            api_port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            lock_timeout_secs: 30,
        };

        // The key for the active environment must exist before any signing path runs.
        if config.key_for(config.environment).is_none() {
            anyhow::bail!(
                "no private key configured for {} (set HYPERLIQUID_{}_KEY)",
                config.environment,
                config.environment.as_str().to_uppercase(),
            );
        }

        Ok(config)
    }

    pub fn key_for(&self, environment: Environment) -> Option<&str> {
        match environment {
            Environment::Testnet => self.testnet_key.as_deref(),
            Environment::Mainnet => self.mainnet_key.as_deref(),
        }
    }
}
