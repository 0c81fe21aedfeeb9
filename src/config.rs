// Runtime configuration, loaded from defaults, an optional `inventory.toml`
// file and `TREFA_`-prefixed environment variables.

use crate::error::VehicleResult;
use crate::fetchers::fast_index::DEFAULT_PAGE_SIZE;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Precomputed fast-index endpoint (the primary fetch strategy).
    pub fast_index_url: String,
    /// Relational backend base URL (PostgREST conventions), the fallback
    /// strategy and the detail/search/view-count surface.
    pub backend_url: String,
    /// API key sent as `apikey` + bearer token when present.
    pub backend_api_key: Option<String>,
    /// Records per page. Both fetchers must agree on this for cache keys to
    /// mean the same thing on either path.
    pub page_size: u32,
    /// Cache entry freshness window, in seconds.
    pub cache_ttl_secs: u64,
    /// Location of the persistent cache tier. `None` disables that tier.
    pub cache_file: Option<String>,
}

impl Settings {
    pub fn new() -> VehicleResult<Self> {
        dotenv::dotenv().ok(); // Load .env file if present

        let builder = Config::builder()
            .set_default(
                "fast_index_url",
                "https://jjepfehmuybpctdzipnu.supabase.co/functions/v1/rapid-inventory",
            )?
            .set_default(
                "backend_url",
                "https://jjepfehmuybpctdzipnu.supabase.co/rest/v1",
            )?
            .set_default("page_size", DEFAULT_PAGE_SIZE as i64)?
            .set_default("cache_ttl_secs", 300)?
            .add_source(File::with_name("inventory").required(false))
            .add_source(Environment::with_prefix("TREFA"));

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}
