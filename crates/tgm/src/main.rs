use std::sync::Arc;

use tgm_core::{
    client::{sandbox::SandboxClientFactory, ClientFactory},
    config::Config,
    Error,
};

#[tokio::main]
async fn main() -> Result<(), tgm_core::Error> {
    tgm_core::logging::init("tgm");

    let cfg = Arc::new(Config::load()?);

    let factory: Arc<dyn ClientFactory> = if cfg.sandbox {
        tracing::warn!("sandbox user-client active; no real invites will be sent");
        Arc::new(SandboxClientFactory::new())
    } else {
        return Err(Error::Config(
            "no MTProto backend is wired into this build; set TGM_SANDBOX=1 for a dry run"
                .to_string(),
        ));
    };

    tgm_telegram::router::run_polling(cfg, factory)
        .await
        .map_err(|e| Error::Remote(format!("telegram bot failed: {e}")))?;

    Ok(())
}
