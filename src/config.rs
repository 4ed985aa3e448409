use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// How long a move offer stays open before the sweep expires it.
    pub offer_ttl_hours: i64,
    /// Slot stride used when no procedure code is given.
    pub default_slot_mins: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let offer_ttl_hours = env::var("OFFER_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(24);
        let default_slot_mins = env::var("DEFAULT_SLOT_MINS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(30);

        Ok(Self {
            database_url,
            bind_addr,
            offer_ttl_hours,
            default_slot_mins,
        })
    }
}
