use crate::api::routes;
use crate::config::SharedConfig;
use crate::dns::Bridge;
use crate::record_store::DynRecordStore;
use std::future::Future;

#[derive(Clone)]
pub(super) struct AppState {
    pub config: SharedConfig,
    pub store: DynRecordStore,
    pub bridge: Bridge,
}

/// Serve the HTTP API on [`Config::api_bind_addr`][crate::config::Config::api_bind_addr].
pub fn new(
    config: SharedConfig,
    store: DynRecordStore,
    bridge: Bridge,
) -> impl Future<Output = hyper::Result<()>> {
    axum::Server::bind(&config.api_bind_addr).serve(
        routes::new(AppState {
            config,
            store,
            bridge,
        })
        .into_make_service(),
    )
}
