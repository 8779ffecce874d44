use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    pub frontend_url: String,
    pub mail_from: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn int_var_or(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;

        Ok(Self {
            database_url,
            bind_addr: var_or("BIND_ADDR", "127.0.0.1:8000"),
            access_ttl_minutes: int_var_or("ACCESS_TOKEN_TTL_MINUTES", 50),
            refresh_ttl_days: int_var_or("REFRESH_TOKEN_TTL_DAYS", 7),
            frontend_url: var_or("FRONTEND_URL", "http://localhost:5173")
                .trim_end_matches('/')
                .to_string(),
            mail_from: var_or("MAIL_FROM", "no-reply@medibook.local"),
        })
    }
}
