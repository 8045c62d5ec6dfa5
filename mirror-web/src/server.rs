//! Mirror web server
//!
//! Binds the router and runs the periodic session expiry sweep alongside it.

use crate::{create_app, AppState, WebConfig, WebError, WebResult};
use mirror_core::MirrorConfig;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

pub struct MirrorServer {
    config: WebConfig,
    state: AppState,
}

impl MirrorServer {
    pub async fn new(config: WebConfig, mirror: MirrorConfig) -> WebResult<Self> {
        let state = AppState::new(mirror, &config).await?;
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn start(self) -> WebResult<()> {
        let address = self.config.address();
        let app = create_app(self.state.clone());

        let sweep_state = self.state.clone();
        let sweep_interval = sweep_state.config.session.sweep_interval_secs.max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval));
            loop {
                interval.tick().await;
                sweep_state.sessions.sweep().await;
            }
        });

        let listener = TcpListener::bind(&address).await.map_err(WebError::Server)?;
        info!(%address, "mirror server listening");

        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "server error");
            return Err(WebError::Server(e));
        }
        Ok(())
    }
}
