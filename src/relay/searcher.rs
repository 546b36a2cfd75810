// Searcher Service Client
//
// Authenticated wrapper over the searcher gRPC service:
// - bundle submission (unary)
// - mempool subscription (server stream), program or write-locked-account filter
// - bundle result subscription (server stream), logged for correlation only
//
// The tonic client is cheap to clone and safe to use from many tasks at once;
// every call goes through the same `BearerInterceptor`.

use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tonic::codec::Streaming;
use tonic::codegen::InterceptedService;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info, warn};

use super::auth::BearerInterceptor;
use super::proto::bundle::{Bundle, BundleResult};
use super::proto::searcher::{
    mempool_subscription::Msg, searcher_service_client::SearcherServiceClient,
    MempoolSubscription, PendingTxNotification, ProgramSubscriptionV0, SendBundleRequest,
    SubscribeBundleResultsRequest, WriteLockedAccountSubscriptionV0,
};

pub type AuthedChannel = InterceptedService<Channel, BearerInterceptor>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("cannot connect to block engine: {0}")]
    Connect(String),
    #[error("{call} failed: {message}")]
    Call { call: &'static str, message: String },
}

impl RelayError {
    fn call(call: &'static str, status: tonic::Status) -> Self {
        RelayError::Call {
            call,
            message: format!("{:?}: {}", status.code(), status.message()),
        }
    }
}

/// Open a channel to the block engine, with TLS for `https` urls.
pub async fn connect_channel(url: &str, timeout: Duration) -> Result<Channel, RelayError> {
    let mut endpoint = Endpoint::from_shared(url.to_string())
        .map_err(|e| RelayError::Connect(e.to_string()))?
        .connect_timeout(timeout)
        .tcp_nodelay(true);
    if url.starts_with("https") {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new())
            .map_err(|e| RelayError::Connect(e.to_string()))?;
    }
    endpoint
        .connect()
        .await
        .map_err(|e| RelayError::Connect(e.to_string()))
}

/// What the mempool stream is filtered on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolFilter {
    /// transactions invoking any of these programs
    Programs(Vec<Pubkey>),
    /// transactions write-locking any of these accounts
    WriteLockedAccounts(Vec<Pubkey>),
}

/// Build the subscription request for `filter`, optionally scoped to regions.
pub fn mempool_subscription(filter: &MempoolFilter, regions: &[String]) -> MempoolSubscription {
    let msg = match filter {
        MempoolFilter::Programs(programs) => Msg::ProgramV0Sub(ProgramSubscriptionV0 {
            programs: programs.iter().map(|p| p.to_string()).collect(),
        }),
        MempoolFilter::WriteLockedAccounts(accounts) => {
            Msg::WlaV0Sub(WriteLockedAccountSubscriptionV0 {
                accounts: accounts.iter().map(|a| a.to_string()).collect(),
            })
        }
    };
    MempoolSubscription {
        regions: regions.to_vec(),
        msg: Some(msg),
    }
}

/// Bundle submission as seen by the execution engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Submit a bundle; returns the server-assigned bundle id.
    async fn send_bundle(&self, bundle: Bundle) -> Result<String, RelayError>;
}

#[derive(Clone)]
pub struct SearcherRelay {
    client: SearcherServiceClient<AuthedChannel>,
}

impl SearcherRelay {
    pub async fn connect(
        url: &str,
        timeout: Duration,
        interceptor: BearerInterceptor,
    ) -> Result<Self, RelayError> {
        let channel = connect_channel(url, timeout).await?;
        info!("Initialized SearcherRelay for {}", url);
        Ok(Self::from_channel(channel, interceptor))
    }

    pub fn from_channel(channel: Channel, interceptor: BearerInterceptor) -> Self {
        Self {
            client: SearcherServiceClient::with_interceptor(channel, interceptor),
        }
    }

    pub async fn subscribe_mempool(
        &self,
        filter: &MempoolFilter,
        regions: &[String],
    ) -> Result<Streaming<PendingTxNotification>, RelayError> {
        let request = mempool_subscription(filter, regions);
        let mut client = self.client.clone();
        let stream = client
            .subscribe_mempool(request)
            .await
            .map_err(|s| RelayError::call("SubscribeMempool", s))?
            .into_inner();
        info!(?filter, ?regions, "Subscribed to mempool");
        Ok(stream)
    }

    pub async fn subscribe_bundle_results(&self) -> Result<Streaming<BundleResult>, RelayError> {
        let mut client = self.client.clone();
        let stream = client
            .subscribe_bundle_results(SubscribeBundleResultsRequest {})
            .await
            .map_err(|s| RelayError::call("SubscribeBundleResults", s))?
            .into_inner();
        Ok(stream)
    }

    /// Log bundle results until the stream ends or `cancel` fires.
    pub fn spawn_bundle_result_logger(
        &self,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let relay = self.clone();
        tokio::spawn(async move {
            let mut stream = match relay.subscribe_bundle_results().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Bundle result subscription unavailable: {}", e);
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = stream.message() => match next {
                        Ok(Some(result)) => info!(bundle_id = %result.bundle_id, "Bundle result"),
                        Err(status) => {
                            warn!("Bundle result stream error: {}", status);
                            return;
                        }
                        Ok(None) => {
                            debug!("Bundle result stream closed");
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl BundleRelay for SearcherRelay {
    async fn send_bundle(&self, bundle: Bundle) -> Result<String, RelayError> {
        let packets = bundle.packets.len();
        let mut client = self.client.clone();
        let response = client
            .send_bundle(SendBundleRequest {
                bundle: Some(bundle),
            })
            .await
            .map_err(|s| RelayError::call("SendBundle", s))?;
        let uuid = response.into_inner().uuid;
        debug!(%uuid, packets, "Bundle accepted by block engine");
        Ok(uuid)
    }
}
