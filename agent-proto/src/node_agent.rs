// This file is the checked-in snapshot of what `build.rs` generates from
// `proto/node_agent.proto`. Regenerate with `cargo build` after editing the
// proto; do not hand-edit message/trait shapes without keeping both in sync.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddressInfo {
    #[prost(string, tag = "1")]
    pub interface: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub address: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CleanupInfo {
    #[prost(message, repeated, tag = "1")]
    pub keep_these: ::prost::alloc::vec::Vec<AddressInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Result {
    #[prost(bool, tag = "1")]
    pub done: bool,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ping {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pong {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}

/// Generated client implementations.
pub mod node_agent_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::*;
    use tonic::codegen::http::Uri;

    #[derive(Debug, Clone)]
    pub struct NodeAgentClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl NodeAgentClient<tonic::transport::Channel> {
        pub async fn connect<D>(dst: D) -> std::result::Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> NodeAgentClient<T>
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

        pub async fn add_address(
            &mut self,
            request: impl tonic::IntoRequest<super::AddressInfo>,
        ) -> std::result::Result<tonic::Response<super::Result>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/plenuslb.v1alpha1.NodeAgent/AddAddress");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("plenuslb.v1alpha1.NodeAgent", "AddAddress"));
            self.inner.unary(req, path, codec).await
        }

        pub async fn remove_address(
            &mut self,
            request: impl tonic::IntoRequest<super::AddressInfo>,
        ) -> std::result::Result<tonic::Response<super::Result>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/plenuslb.v1alpha1.NodeAgent/RemoveAddress");
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "plenuslb.v1alpha1.NodeAgent",
                "RemoveAddress",
            ));
            self.inner.unary(req, path, codec).await
        }

        pub async fn cleanup(
            &mut self,
            request: impl tonic::IntoRequest<super::CleanupInfo>,
        ) -> std::result::Result<tonic::Response<super::Result>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/plenuslb.v1alpha1.NodeAgent/Cleanup");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("plenuslb.v1alpha1.NodeAgent", "Cleanup"));
            self.inner.unary(req, path, codec).await
        }

        pub async fn health_probe(
            &mut self,
            request: impl tonic::IntoRequest<super::Ping>,
        ) -> std::result::Result<tonic::Response<super::Pong>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/plenuslb.v1alpha1.NodeAgent/HealthProbe");
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "plenuslb.v1alpha1.NodeAgent",
                "HealthProbe",
            ));
            self.inner.unary(req, path, codec).await
        }
    }
}

/// Generated server implementations.
pub mod node_agent_server {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::*;

    /// Generated trait containing gRPC methods that should be implemented for use with NodeAgentServer.
    #[async_trait]
    pub trait NodeAgent: Send + Sync + 'static {
        async fn add_address(
            &self,
            request: tonic::Request<super::AddressInfo>,
        ) -> std::result::Result<tonic::Response<super::Result>, tonic::Status>;
        async fn remove_address(
            &self,
            request: tonic::Request<super::AddressInfo>,
        ) -> std::result::Result<tonic::Response<super::Result>, tonic::Status>;
        async fn cleanup(
            &self,
            request: tonic::Request<super::CleanupInfo>,
        ) -> std::result::Result<tonic::Response<super::Result>, tonic::Status>;
        async fn health_probe(
            &self,
            request: tonic::Request<super::Ping>,
        ) -> std::result::Result<tonic::Response<super::Pong>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct NodeAgentServer<T: NodeAgent> {
        inner: Arc<T>,
    }

    impl<T: NodeAgent> NodeAgentServer<T> {
        pub fn new(inner: T) -> Self {
            Self {
                inner: Arc::new(inner),
            }
        }
    }

    impl<T, B> tonic::codegen::Service<http::Request<B>> for NodeAgentServer<T>
    where
        T: NodeAgent,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/plenuslb.v1alpha1.NodeAgent/AddAddress" => {
                    struct AddAddressSvc<T: NodeAgent>(Arc<T>);
                    impl<T: NodeAgent> tonic::server::UnaryService<super::AddressInfo> for AddAddressSvc<T> {
                        type Response = super::Result;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::AddressInfo>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.add_address(request).await })
                        }
                    }
                    let method = AddAddressSvc(inner);
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Box::pin(async move { Ok(grpc.unary(method, req).await) })
                }
                "/plenuslb.v1alpha1.NodeAgent/RemoveAddress" => {
                    struct RemoveAddressSvc<T: NodeAgent>(Arc<T>);
                    impl<T: NodeAgent> tonic::server::UnaryService<super::AddressInfo> for RemoveAddressSvc<T> {
                        type Response = super::Result;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::AddressInfo>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.remove_address(request).await })
                        }
                    }
                    let method = RemoveAddressSvc(inner);
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Box::pin(async move { Ok(grpc.unary(method, req).await) })
                }
                "/plenuslb.v1alpha1.NodeAgent/Cleanup" => {
                    struct CleanupSvc<T: NodeAgent>(Arc<T>);
                    impl<T: NodeAgent> tonic::server::UnaryService<super::CleanupInfo> for CleanupSvc<T> {
                        type Response = super::Result;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::CleanupInfo>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.cleanup(request).await })
                        }
                    }
                    let method = CleanupSvc(inner);
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Box::pin(async move { Ok(grpc.unary(method, req).await) })
                }
                "/plenuslb.v1alpha1.NodeAgent/HealthProbe" => {
                    struct HealthProbeSvc<T: NodeAgent>(Arc<T>);
                    impl<T: NodeAgent> tonic::server::UnaryService<super::Ping> for HealthProbeSvc<T> {
                        type Response = super::Pong;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(&mut self, request: tonic::Request<super::Ping>) -> Self::Future {
                            let inner = self.0.clone();
                            Box::pin(async move { inner.health_probe(request).await })
                        }
                    }
                    let method = HealthProbeSvc(inner);
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Box::pin(async move { Ok(grpc.unary(method, req).await) })
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(empty_body())
                        .unwrap())
                }),
            }
        }
    }

    impl<T: NodeAgent> Clone for NodeAgentServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
}
