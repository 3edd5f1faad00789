pub mod api;
pub mod core;
pub mod domain;
pub mod schemas;
pub mod session;

mod cli;

#[cfg(test)]
mod test_support;

use crate::core::{config::Settings, telemetry};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;

    tracing::info!(
        base_url = %settings.api().base_url,
        environment = %settings.runtime().environment.as_str(),
        draft_dir = %settings.storage().draft_dir,
        "TestVerse exam client starting"
    );

    cli::run(settings).await
}
