// Block Engine Authentication
//
// Challenge/response login against the block engine auth service:
// 1. UNAUTHENTICATED: send our pubkey with role SEARCHER, receive a challenge
// 2. CHALLENGED: sign `base58(pubkey) + "-" + challenge`, exchange it for an
//    access token and a refresh token
// 3. AUTHENTICATED: every searcher call carries `authorization: Bearer <token>`
//
// The session lives behind a lock shared with `BearerInterceptor`; a background
// task refreshes the access token before it expires and falls back to a full
// login when the refresh token is gone or the refresh call fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use solana_sdk::signature::{Keypair, Signer};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tonic::{metadata::MetadataValue, service::Interceptor, transport::Channel, Request, Status};
use tracing::{debug, error, info, warn};

use super::proto::auth::{
    auth_service_client::AuthServiceClient, GenerateAuthChallengeRequest,
    GenerateAuthTokensRequest, RefreshAccessTokenRequest, Role, Token,
};

use super::searcher::connect_channel;

pub const AUTHORIZATION_HEADER: &str = "authorization";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("auth service rejected {call}: {message}")]
    Rejected { call: &'static str, message: String },
    #[error("auth response to {0} carried no token")]
    MissingToken(&'static str),
    #[error("token expiry is not a valid timestamp")]
    InvalidExpiry,
    #[error("cannot connect to auth service: {0}")]
    Connect(String),
}

/// Token value plus its expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    fn from_proto(token: Option<Token>, call: &'static str) -> Result<Self, AuthError> {
        let token = token.ok_or(AuthError::MissingToken(call))?;
        if token.value.is_empty() {
            return Err(AuthError::MissingToken(call));
        }
        let expires_at = match token.expires_at_utc {
            Some(ts) => DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32)
                .ok_or(AuthError::InvalidExpiry)?,
            None => return Err(AuthError::InvalidExpiry),
        };
        Ok(Self {
            value: token.value,
            expires_at,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Session shared between the refresh task and every outgoing call.
pub type SharedSession = Arc<RwLock<Option<AuthSession>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Challenged,
    Authenticated,
}

/// The three auth service calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn generate_auth_challenge(&self, role: Role, pubkey: Vec<u8>)
        -> Result<String, AuthError>;

    async fn generate_auth_tokens(
        &self,
        challenge: String,
        client_pubkey: Vec<u8>,
        signed_challenge: Vec<u8>,
    ) -> Result<(IssuedToken, IssuedToken), AuthError>;

    async fn refresh_access_token(&self, refresh_token: String) -> Result<IssuedToken, AuthError>;
}

#[async_trait]
impl AuthApi for AuthServiceClient<Channel> {
    async fn generate_auth_challenge(
        &self,
        role: Role,
        pubkey: Vec<u8>,
    ) -> Result<String, AuthError> {
        let mut client = self.clone();
        let request = GenerateAuthChallengeRequest {
            role: role as i32,
            pubkey,
        };
        let response = AuthServiceClient::generate_auth_challenge(&mut client, request)
            .await
            .map_err(|status| rejected("GenerateAuthChallenge", status))?;
        Ok(response.into_inner().challenge)
    }

    async fn generate_auth_tokens(
        &self,
        challenge: String,
        client_pubkey: Vec<u8>,
        signed_challenge: Vec<u8>,
    ) -> Result<(IssuedToken, IssuedToken), AuthError> {
        let mut client = self.clone();
        let request = GenerateAuthTokensRequest {
            challenge,
            client_pubkey,
            signed_challenge,
        };
        let response = AuthServiceClient::generate_auth_tokens(&mut client, request)
            .await
            .map_err(|status| rejected("GenerateAuthTokens", status))?
            .into_inner();
        Ok((
            IssuedToken::from_proto(response.access_token, "GenerateAuthTokens")?,
            IssuedToken::from_proto(response.refresh_token, "GenerateAuthTokens")?,
        ))
    }

    async fn refresh_access_token(&self, refresh_token: String) -> Result<IssuedToken, AuthError> {
        let mut client = self.clone();
        let request = RefreshAccessTokenRequest { refresh_token };
        let response = AuthServiceClient::refresh_access_token(&mut client, request)
            .await
            .map_err(|status| rejected("RefreshAccessToken", status))?
            .into_inner();
        IssuedToken::from_proto(response.access_token, "RefreshAccessToken")
    }
}

fn rejected(call: &'static str, status: Status) -> AuthError {
    AuthError::Rejected {
        call,
        message: format!("{:?}: {}", status.code(), status.message()),
    }
}

/// Message signed during the handshake.
pub fn challenge_message(keypair: &Keypair, challenge: &str) -> String {
    format!("{}-{}", keypair.pubkey(), challenge)
}

/// Drives the challenge/response handshake and token refresh.
pub struct RelayAuthClient<A> {
    api: A,
    keypair: Arc<Keypair>,
    session: SharedSession,
}

impl RelayAuthClient<AuthServiceClient<Channel>> {
    pub async fn connect(
        url: &str,
        timeout: Duration,
        keypair: Arc<Keypair>,
    ) -> Result<Self, AuthError> {
        let channel = connect_channel(url, timeout)
            .await
            .map_err(|e| AuthError::Connect(e.to_string()))?;
        Ok(Self::new(AuthServiceClient::new(channel), keypair))
    }
}

impl<A: AuthApi> RelayAuthClient<A> {
    pub fn new(api: A, keypair: Arc<Keypair>) -> Self {
        info!("Initialized RelayAuthClient for {}", keypair.pubkey());
        Self {
            api,
            keypair,
            session: Arc::new(RwLock::new(None)),
        }
    }

    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    pub fn state(&self) -> AuthState {
        if self.session.read().is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        }
    }

    pub fn interceptor(&self) -> BearerInterceptor {
        BearerInterceptor::new(self.session())
    }

    /// Full challenge/response login; replaces any existing session.
    pub async fn authenticate(&self) -> Result<AuthSession, AuthError> {
        let pubkey = self.keypair.pubkey();
        debug!(state = ?AuthState::Unauthenticated, %pubkey, "Requesting auth challenge");

        let challenge = self
            .api
            .generate_auth_challenge(Role::Searcher, pubkey.to_bytes().to_vec())
            .await?;
        debug!(state = ?AuthState::Challenged, "Received auth challenge");

        let message = challenge_message(&self.keypair, &challenge);
        let signature = self.keypair.sign_message(message.as_bytes());

        let (access, refresh) = self
            .api
            .generate_auth_tokens(message, pubkey.to_bytes().to_vec(), signature.as_ref().to_vec())
            .await?;

        let session = AuthSession { access, refresh };
        info!(
            state = ?AuthState::Authenticated,
            access_expires_at = %session.access.expires_at,
            refresh_expires_at = %session.refresh.expires_at,
            "Authenticated with block engine"
        );
        *self.session.write() = Some(session.clone());
        Ok(session)
    }

    /// Renew the access token, or log in again when that is not possible.
    pub async fn refresh(&self) -> Result<AuthSession, AuthError> {
        let current = self.session.read().clone();
        let Some(current) = current else {
            return self.authenticate().await;
        };

        if current.refresh.is_expired_at(Utc::now()) {
            info!("Refresh token expired, re-authenticating");
            return self.authenticate().await;
        }

        match self.api.refresh_access_token(current.refresh.value.clone()).await {
            Ok(access) => {
                let session = AuthSession {
                    access,
                    refresh: current.refresh,
                };
                info!(access_expires_at = %session.access.expires_at, "Refreshed access token");
                *self.session.write() = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                warn!("Access token refresh failed, re-authenticating: {}", e);
                self.authenticate().await
            }
        }
    }

    /// Time to wait before the next refresh.
    pub fn next_refresh_in(&self, margin: Duration, now: DateTime<Utc>) -> Duration {
        let guard = self.session.read();
        let Some(session) = guard.as_ref() else {
            return Duration::ZERO;
        };
        let margin = chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::zero());
        (session.access.expires_at - margin - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

impl<A: AuthApi + 'static> RelayAuthClient<A> {
    /// Keep the session fresh until `cancel` fires.
    pub fn spawn_refresh_task(
        self: Arc<Self>,
        margin: Duration,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let wait = self.next_refresh_in(margin, Utc::now());
                debug!(wait_secs = wait.as_secs(), "Next access token refresh scheduled");

                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Token refresh task stopped");
                        return;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }

                if let Err(e) = self.refresh().await {
                    error!("Failed to renew block engine session: {}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
            }
        })
    }
}

/// Attaches the current access token to every outgoing call.
///
/// Used for unary and streaming calls alike; a missing token fails the call
/// locally with `Unauthenticated` instead of sending it bare.
#[derive(Clone)]
pub struct BearerInterceptor {
    session: SharedSession,
}

impl BearerInterceptor {
    pub fn new(session: SharedSession) -> Self {
        Self { session }
    }
}

impl Interceptor for BearerInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let token = self
            .session
            .read()
            .as_ref()
            .map(|s| s.access.value.clone())
            .unwrap_or_default();
        if token.is_empty() {
            return Err(Status::unauthenticated("no block engine access token"));
        }

        let value = MetadataValue::try_from(format!("Bearer {token}"))
            .map_err(|_| Status::internal("access token is not a valid header value"))?;
        request.metadata_mut().insert(AUTHORIZATION_HEADER, value);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use solana_sdk::signature::Signature;

    fn token(value: &str, secs_from_now: i64) -> IssuedToken {
        IssuedToken {
            value: value.to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(secs_from_now),
        }
    }

    fn session_with(access: IssuedToken, refresh: IssuedToken) -> SharedSession {
        Arc::new(RwLock::new(Some(AuthSession { access, refresh })))
    }

    #[tokio::test]
    async fn test_authenticate_signs_pubkey_dash_challenge() {
        let keypair = Arc::new(Keypair::new());
        let pubkey = keypair.pubkey();
        let expected_message = format!("{}-abc123", pubkey);

        let mut api = MockAuthApi::new();
        api.expect_generate_auth_challenge()
            .with(eq(Role::Searcher), eq(pubkey.to_bytes().to_vec()))
            .times(1)
            .returning(|_, _| Ok("abc123".to_string()));
        let check_message = expected_message.clone();
        api.expect_generate_auth_tokens()
            .times(1)
            .returning(move |challenge, client_pubkey, signed| {
                assert_eq!(challenge, check_message);
                let signature = Signature::try_from(signed.as_slice()).unwrap();
                assert!(signature.verify(&client_pubkey, challenge.as_bytes()));
                Ok((token("access", 600), token("refresh", 3600)))
            });

        let client = RelayAuthClient::new(api, keypair);
        assert_eq!(client.state(), AuthState::Unauthenticated);
        let session = client.authenticate().await.unwrap();
        assert_eq!(session.access.value, "access");
        assert_eq!(client.state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_challenge_rejection_is_an_error() {
        let mut api = MockAuthApi::new();
        api.expect_generate_auth_challenge().returning(|_, _| {
            Err(AuthError::Rejected {
                call: "GenerateAuthChallenge",
                message: "PermissionDenied".to_string(),
            })
        });
        api.expect_generate_auth_tokens().never();

        let client = RelayAuthClient::new(api, Arc::new(Keypair::new()));
        assert!(client.authenticate().await.is_err());
        assert_eq!(client.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token() {
        let mut api = MockAuthApi::new();
        api.expect_refresh_access_token()
            .with(eq("refresh".to_string()))
            .times(1)
            .returning(|_| Ok(token("access-2", 600)));
        api.expect_generate_auth_challenge().never();

        let client = RelayAuthClient::new(api, Arc::new(Keypair::new()));
        *client.session.write() = Some(AuthSession {
            access: token("access-1", 5),
            refresh: token("refresh", 3600),
        });

        let session = client.refresh().await.unwrap();
        assert_eq!(session.access.value, "access-2");
        assert_eq!(session.refresh.value, "refresh");
    }

    #[tokio::test]
    async fn test_expired_refresh_token_triggers_full_login() {
        let mut api = MockAuthApi::new();
        api.expect_refresh_access_token().never();
        api.expect_generate_auth_challenge()
            .times(1)
            .returning(|_, _| Ok("c".to_string()));
        api.expect_generate_auth_tokens()
            .times(1)
            .returning(|_, _, _| Ok((token("fresh", 600), token("fresh-refresh", 3600))));

        let client = RelayAuthClient::new(api, Arc::new(Keypair::new()));
        *client.session.write() = Some(AuthSession {
            access: token("old", -10),
            refresh: token("old-refresh", -1),
        });

        let session = client.refresh().await.unwrap();
        assert_eq!(session.access.value, "fresh");
    }

    #[test]
    fn test_next_refresh_respects_margin() {
        let client = RelayAuthClient::new(MockAuthApi::new(), Arc::new(Keypair::new()));
        assert_eq!(client.next_refresh_in(Duration::from_secs(60), Utc::now()), Duration::ZERO);

        *client.session.write() = Some(AuthSession {
            access: token("a", 600),
            refresh: token("r", 3600),
        });
        let wait = client.next_refresh_in(Duration::from_secs(60), Utc::now());
        assert!(wait <= Duration::from_secs(540));
        assert!(wait >= Duration::from_secs(530));
    }

    #[test]
    fn test_interceptor_attaches_bearer() {
        let mut interceptor =
            BearerInterceptor::new(session_with(token("tok", 600), token("r", 3600)));
        let request = interceptor.call(Request::new(())).unwrap();
        assert_eq!(
            request.metadata().get(AUTHORIZATION_HEADER).unwrap(),
            "Bearer tok"
        );
    }

    #[test]
    fn test_interceptor_without_session_fails_closed() {
        let mut interceptor = BearerInterceptor::new(Arc::new(RwLock::new(None)));
        let status = interceptor.call(Request::new(())).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_token_without_expiry_is_rejected() {
        let proto = Token {
            value: "v".to_string(),
            expires_at_utc: None,
        };
        assert_eq!(
            IssuedToken::from_proto(Some(proto), "x"),
            Err(AuthError::InvalidExpiry)
        );
        assert_eq!(
            IssuedToken::from_proto(None, "x"),
            Err(AuthError::MissingToken("x"))
        );
    }
}
