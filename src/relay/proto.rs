// Block engine wire protocol
//
// Protobuf messages and gRPC clients for the auth and searcher services,
// declared directly with `prost` derives and `tonic` client plumbing. Only the
// messages and RPCs this crate calls are declared; unknown fields on incoming
// messages are skipped by the decoder.

pub mod shared {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Header {
        #[prost(message, optional, tag = "1")]
        pub ts: ::core::option::Option<::prost_types::Timestamp>,
    }
}

pub mod packet {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Packet {
        #[prost(bytes = "vec", tag = "1")]
        pub data: ::prost::alloc::vec::Vec<u8>,
        #[prost(message, optional, tag = "2")]
        pub meta: ::core::option::Option<Meta>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Meta {
        #[prost(uint64, tag = "1")]
        pub size: u64,
        #[prost(string, tag = "2")]
        pub addr: ::prost::alloc::string::String,
        #[prost(uint32, tag = "3")]
        pub port: u32,
        #[prost(message, optional, tag = "4")]
        pub flags: ::core::option::Option<PacketFlags>,
        #[prost(uint64, tag = "5")]
        pub sender_stake: u64,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct PacketFlags {
        #[prost(bool, tag = "1")]
        pub discard: bool,
        #[prost(bool, tag = "2")]
        pub forwarded: bool,
        #[prost(bool, tag = "3")]
        pub repair: bool,
        #[prost(bool, tag = "4")]
        pub simple_vote_tx: bool,
        #[prost(bool, tag = "5")]
        pub tracer_packet: bool,
    }
}

pub mod bundle {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Bundle {
        #[prost(message, optional, tag = "2")]
        pub header: ::core::option::Option<super::shared::Header>,
        #[prost(message, repeated, tag = "3")]
        pub packets: ::prost::alloc::vec::Vec<super::packet::Packet>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BundleResult {
        #[prost(string, tag = "1")]
        pub bundle_id: ::prost::alloc::string::String,
    }
}

pub mod auth {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Role {
        Relayer = 0,
        Searcher = 1,
        Validator = 2,
        ShredstreamSubscriber = 3,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GenerateAuthChallengeRequest {
        #[prost(enumeration = "Role", tag = "1")]
        pub role: i32,
        #[prost(bytes = "vec", tag = "2")]
        pub pubkey: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GenerateAuthChallengeResponse {
        #[prost(string, tag = "1")]
        pub challenge: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GenerateAuthTokensRequest {
        /// `base58(pubkey) + "-" + challenge`
        #[prost(string, tag = "1")]
        pub challenge: ::prost::alloc::string::String,
        #[prost(bytes = "vec", tag = "2")]
        pub client_pubkey: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "3")]
        pub signed_challenge: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Token {
        #[prost(string, tag = "1")]
        pub value: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "2")]
        pub expires_at_utc: ::core::option::Option<::prost_types::Timestamp>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GenerateAuthTokensResponse {
        #[prost(message, optional, tag = "1")]
        pub access_token: ::core::option::Option<Token>,
        #[prost(message, optional, tag = "2")]
        pub refresh_token: ::core::option::Option<Token>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RefreshAccessTokenRequest {
        #[prost(string, tag = "1")]
        pub refresh_token: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RefreshAccessTokenResponse {
        #[prost(message, optional, tag = "1")]
        pub access_token: ::core::option::Option<Token>,
    }

    pub mod auth_service_client {
        use tonic::codegen::http::Uri;
        use tonic::codegen::*;

        #[derive(Debug, Clone)]
        pub struct AuthServiceClient<T> {
            inner: tonic::client::Grpc<T>,
        }

        impl AuthServiceClient<tonic::transport::Channel> {
            pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
            where
                D: TryInto<tonic::transport::Endpoint>,
                D::Error: Into<StdError>,
            {
                let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
                Ok(Self::new(conn))
            }
        }

        impl<T> AuthServiceClient<T>
        where
            T: tonic::client::GrpcService<tonic::body::BoxBody>,
            T::Error: Into<StdError>,
            T::ResponseBody: Body<Data = Bytes> + Send + 'static,
            <T::ResponseBody as Body>::Error: Into<StdError> + Send,
        {
            pub fn new(inner: T) -> Self {
                let inner = tonic::client::Grpc::new(inner);
                Self { inner }
            }

            pub fn with_origin(inner: T, origin: Uri) -> Self {
                let inner = tonic::client::Grpc::with_origin(inner, origin);
                Self { inner }
            }

            pub async fn generate_auth_challenge(
                &mut self,
                request: impl tonic::IntoRequest<super::GenerateAuthChallengeRequest>,
            ) -> std::result::Result<
                tonic::Response<super::GenerateAuthChallengeResponse>,
                tonic::Status,
            > {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/auth.AuthService/GenerateAuthChallenge",
                );
                self.inner.unary(request.into_request(), path, codec).await
            }

            pub async fn generate_auth_tokens(
                &mut self,
                request: impl tonic::IntoRequest<super::GenerateAuthTokensRequest>,
            ) -> std::result::Result<tonic::Response<super::GenerateAuthTokensResponse>, tonic::Status>
            {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path =
                    http::uri::PathAndQuery::from_static("/auth.AuthService/GenerateAuthTokens");
                self.inner.unary(request.into_request(), path, codec).await
            }

            pub async fn refresh_access_token(
                &mut self,
                request: impl tonic::IntoRequest<super::RefreshAccessTokenRequest>,
            ) -> std::result::Result<tonic::Response<super::RefreshAccessTokenResponse>, tonic::Status>
            {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path =
                    http::uri::PathAndQuery::from_static("/auth.AuthService/RefreshAccessToken");
                self.inner.unary(request.into_request(), path, codec).await
            }
        }
    }
}

pub mod searcher {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SendBundleRequest {
        #[prost(message, optional, tag = "1")]
        pub bundle: ::core::option::Option<super::bundle::Bundle>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SendBundleResponse {
        /// server uuid for the bundle
        #[prost(string, tag = "1")]
        pub uuid: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct WriteLockedAccountSubscriptionV0 {
        #[prost(string, repeated, tag = "1")]
        pub accounts: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ProgramSubscriptionV0 {
        #[prost(string, repeated, tag = "1")]
        pub programs: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MempoolSubscription {
        /// empty means all regions
        #[prost(string, repeated, tag = "3")]
        pub regions: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
        #[prost(oneof = "mempool_subscription::Msg", tags = "1, 2")]
        pub msg: ::core::option::Option<mempool_subscription::Msg>,
    }

    pub mod mempool_subscription {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Msg {
            #[prost(message, tag = "1")]
            WlaV0Sub(super::WriteLockedAccountSubscriptionV0),
            #[prost(message, tag = "2")]
            ProgramV0Sub(super::ProgramSubscriptionV0),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PendingTxNotification {
        #[prost(message, optional, tag = "1")]
        pub server_side_ts: ::core::option::Option<::prost_types::Timestamp>,
        #[prost(message, optional, tag = "2")]
        pub expiration_time: ::core::option::Option<::prost_types::Timestamp>,
        #[prost(message, repeated, tag = "3")]
        pub transactions: ::prost::alloc::vec::Vec<super::packet::Packet>,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct SubscribeBundleResultsRequest {}

    pub mod searcher_service_client {
        use tonic::codegen::http::Uri;
        use tonic::codegen::*;

        #[derive(Debug, Clone)]
        pub struct SearcherServiceClient<T> {
            inner: tonic::client::Grpc<T>,
        }

        impl SearcherServiceClient<tonic::transport::Channel> {
            pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
            where
                D: TryInto<tonic::transport::Endpoint>,
                D::Error: Into<StdError>,
            {
                let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
                Ok(Self::new(conn))
            }
        }

        impl<T> SearcherServiceClient<T>
        where
            T: tonic::client::GrpcService<tonic::body::BoxBody>,
            T::Error: Into<StdError>,
            T::ResponseBody: Body<Data = Bytes> + Send + 'static,
            <T::ResponseBody as Body>::Error: Into<StdError> + Send,
        {
            pub fn new(inner: T) -> Self {
                let inner = tonic::client::Grpc::new(inner);
                Self { inner }
            }

            pub fn with_origin(inner: T, origin: Uri) -> Self {
                let inner = tonic::client::Grpc::with_origin(inner, origin);
                Self { inner }
            }

            pub fn with_interceptor<F>(
                inner: T,
                interceptor: F,
            ) -> SearcherServiceClient<InterceptedService<T, F>>
            where
                F: tonic::service::Interceptor,
                T::ResponseBody: Default,
                T: tonic::codegen::Service<
                    http::Request<tonic::body::BoxBody>,
                    Response = http::Response<
                        <T as tonic::client::GrpcService<tonic::body::BoxBody>>::ResponseBody,
                    >,
                >,
                <T as tonic::codegen::Service<http::Request<tonic::body::BoxBody>>>::Error:
                    Into<StdError> + Send + Sync,
            {
                SearcherServiceClient::new(InterceptedService::new(inner, interceptor))
            }

            pub async fn send_bundle(
                &mut self,
                request: impl tonic::IntoRequest<super::SendBundleRequest>,
            ) -> std::result::Result<tonic::Response<super::SendBundleResponse>, tonic::Status>
            {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path =
                    http::uri::PathAndQuery::from_static("/searcher.SearcherService/SendBundle");
                self.inner.unary(request.into_request(), path, codec).await
            }

            pub async fn subscribe_mempool(
                &mut self,
                request: impl tonic::IntoRequest<super::MempoolSubscription>,
            ) -> std::result::Result<
                tonic::Response<tonic::codec::Streaming<super::PendingTxNotification>>,
                tonic::Status,
            > {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/searcher.SearcherService/SubscribeMempool",
                );
                self.inner
                    .server_streaming(request.into_request(), path, codec)
                    .await
            }

            pub async fn subscribe_bundle_results(
                &mut self,
                request: impl tonic::IntoRequest<super::SubscribeBundleResultsRequest>,
            ) -> std::result::Result<
                tonic::Response<tonic::codec::Streaming<super::super::bundle::BundleResult>>,
                tonic::Status,
            > {
                self.inner.ready().await.map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
                let codec = tonic::codec::ProstCodec::default();
                let path = http::uri::PathAndQuery::from_static(
                    "/searcher.SearcherService/SubscribeBundleResults",
                );
                self.inner
                    .server_streaming(request.into_request(), path, codec)
                    .await
            }
        }
    }
}
