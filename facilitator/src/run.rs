//! fluxa-x402 facilitator HTTP entrypoint.
//!
//! Launches an Axum server exposing the x402 protocol surface:
//!
//! - `POST /verify` – verify a payment payload against requirements
//! - `POST /settle` – settle an accepted payment payload
//! - `GET /supported` – list supported payment kinds
//! - `GET /benchmark/metrics` – receipt and settlement counters
//!
//! Scheme wiring follows the config file: the credit scheme on
//! `fluxa:monetize`, the deferred scheme on `eip155:*` with an optional
//! background settlement loop. Shutdown is graceful: SIGTERM/SIGINT stop
//! the listener and the scheduler; in-flight settlements complete.

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use alloy_network::{Ethereum, EthereumWallet, NetworkWallet};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;

use fluxa_x402_credit::CreditFacilitator;
use fluxa_x402_credit::http_signature::directory::HttpKeyDirectory;
use fluxa_x402_odp::chain::Eip155OdpProvider;
use fluxa_x402_odp::facilitator::{OdpConfig, OdpDeferredFacilitator};
use fluxa_x402_odp::store::InMemorySessionStore;
use fluxa_x402_odp::{SettlementScheduler, SessionStore};
use fluxa_x402_types::scheme::{FacilitatorScheme, FacilitatorSchemeRegistry};

use crate::config::{Config, OdpSchemeConfig};
use crate::dispatch::FacilitatorLocal;
use crate::handlers::{self, AppState};
use crate::metrics::BenchmarkMetrics;
use crate::sig_down::shutdown_token;

fn build_odp_provider(
    config: &OdpSchemeConfig,
) -> Result<Eip155OdpProvider<DynProvider>, Box<dyn std::error::Error>> {
    let keys = config.resolved_signer_keys()?;
    let signers = keys
        .iter()
        .map(|key| {
            key.parse::<PrivateKeySigner>()
                .map(|s| s.with_chain_id(Some(config.chain_id)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut signers = signers.into_iter();
    let first_signer = signers
        .next()
        .ok_or("at least one signer should be provided")?;
    let mut wallet = EthereumWallet::from(first_signer);
    for signer in signers {
        wallet.register_signer(signer);
    }
    let signer_addresses =
        NetworkWallet::<Ethereum>::signer_addresses(&wallet).collect::<Vec<_>>();

    let provider = ProviderBuilder::new()
        .wallet(wallet)
        .connect_http(config.rpc_url.clone())
        .erased();

    Ok(Eip155OdpProvider::new(
        provider,
        config.chain_id,
        config.debit_wallet.inner(),
        config.settlement_contract.inner(),
        signer_addresses,
    ))
}

/// Initializes and serves the facilitator until shutdown.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    let token = shutdown_token()?;

    let mut registry = FacilitatorSchemeRegistry::new();
    let mut metrics = BenchmarkMetrics::new();

    if let Some(credit) = config.credit() {
        let directory = Arc::new(HttpKeyDirectory::new(credit.allow_loopback_agents));
        let facilitator = Arc::new(CreditFacilitator::new(directory));
        registry = registry.and_register(facilitator);
        tracing::info!("serving fluxacredit on fluxa:monetize");
    }

    if let Some(odp) = config.odp() {
        let provider = build_odp_provider(odp)?;
        let store = Arc::new(InMemorySessionStore::new()) as Arc<dyn SessionStore>;
        let facilitator = Arc::new(OdpDeferredFacilitator::new(
            OdpConfig {
                settlement_contract: odp.settlement_contract,
                debit_wallet: odp.debit_wallet,
                withdraw_delay_seconds: odp.withdraw_delay_seconds,
                settlement_mode: odp.settlement_mode,
                authorized_processors: odp.authorized_processors.clone(),
                max_receipts_per_settlement: odp.max_receipts_per_settlement,
                max_amount_per_receipt: odp.max_amount_per_receipt,
            },
            Arc::new(provider),
            store,
        ));
        registry =
            registry.and_register(Arc::clone(&facilitator) as Arc<dyn FacilitatorScheme>);
        metrics = metrics.with_source(Arc::clone(&facilitator) as _);
        if let Some(interval) = odp.auto_settle_interval_seconds {
            SettlementScheduler::new(
                Arc::clone(&facilitator),
                Duration::from_secs(interval),
                token.clone(),
            )
            .spawn();
            tracing::info!(interval_seconds = interval, "settlement scheduler started");
        }
        tracing::info!(chain_id = odp.chain_id, mode = ?odp.settlement_mode, "serving odp-deferred on eip155:*");
    }

    let state = AppState {
        facilitator: FacilitatorLocal::new(Arc::new(registry)),
        metrics,
    };
    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(state))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("failed to bind to {addr}: {e}"))?;
    tracing::info!("starting server at http://{addr}");

    let graceful = {
        let token = token.clone();
        async move { token.cancelled().await }
    };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(graceful)
        .await?;

    Ok(())
}
