//! HTTP server command — `leadcrm serve`.

use anyhow::Result;
use leadcrm::config::CrmConfig;

pub async fn cmd_serve(config: CrmConfig) -> Result<()> {
    if config.server.dev_mode {
        tracing::warn!("Dev mode enabled: CORS is permissive");
    }
    leadcrm::crm::server::start_server(config).await
}
