//! The `Provider` gRPC service: server-side trait and the tonic routing layer.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tonic::codegen::{http, Body, Service, StdError};

use super::messages::*;

/// Fully qualified service name used for routing.
pub const SERVICE_NAME: &str = "hemmer.provider.v1.Provider";

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

macro_rules! provider_rpcs {
    ($($route:literal => $method:ident($req:ty) -> $resp:ty;)+) => {
        /// Server-side handler for every RPC of the provider protocol.
        #[async_trait::async_trait]
        pub trait Provider: Send + Sync + 'static {
            $(
                #[allow(missing_docs)]
                async fn $method(
                    &self,
                    request: tonic::Request<$req>,
                ) -> Result<tonic::Response<$resp>, tonic::Status>;
            )+
        }

        impl<T, B> Service<http::Request<B>> for ProviderServer<T>
        where
            T: Provider,
            B: Body + Send + 'static,
            B::Error: Into<StdError> + Send + 'static,
        {
            type Response = http::Response<tonic::body::Body>;
            type Error = Infallible;
            type Future = BoxFuture<Self::Response, Self::Error>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, req: http::Request<B>) -> Self::Future {
                let inner = Arc::clone(&self.inner);
                match req.uri().path() {
                    $(
                        $route => {
                            #[allow(non_camel_case_types)]
                            struct $method<T: Provider>(Arc<T>);

                            impl<T: Provider> tonic::server::UnaryService<$req> for $method<T> {
                                type Response = $resp;
                                type Future = BoxFuture<tonic::Response<$resp>, tonic::Status>;

                                fn call(&mut self, request: tonic::Request<$req>) -> Self::Future {
                                    let inner = Arc::clone(&self.0);
                                    Box::pin(async move { <T as Provider>::$method(&inner, request).await })
                                }
                            }

                            Box::pin(async move {
                                let codec = tonic_prost::ProstCodec::default();
                                let mut grpc = tonic::server::Grpc::new(codec);
                                Ok(grpc.unary($method(inner), req).await)
                            })
                        },
                    )+
                    _ => Box::pin(async move {
                        Ok(tonic::Status::unimplemented("unknown provider method").into_http())
                    }),
                }
            }
        }
    };
}

provider_rpcs! {
    "/hemmer.provider.v1.Provider/GetMetadata" => get_metadata(GetMetadataRequest) -> GetMetadataResponse;
    "/hemmer.provider.v1.Provider/GetSchema" => get_schema(GetSchemaRequest) -> GetSchemaResponse;
    "/hemmer.provider.v1.Provider/ValidateProviderConfig" => validate_provider_config(ValidateProviderConfigRequest) -> ValidateProviderConfigResponse;
    "/hemmer.provider.v1.Provider/Configure" => configure(ConfigureRequest) -> ConfigureResponse;
    "/hemmer.provider.v1.Provider/Stop" => stop(StopRequest) -> StopResponse;
    "/hemmer.provider.v1.Provider/ValidateResourceConfig" => validate_resource_config(ValidateResourceConfigRequest) -> ValidateResourceConfigResponse;
    "/hemmer.provider.v1.Provider/UpgradeResourceState" => upgrade_resource_state(UpgradeResourceStateRequest) -> UpgradeResourceStateResponse;
    "/hemmer.provider.v1.Provider/Plan" => plan(PlanRequest) -> PlanResponse;
    "/hemmer.provider.v1.Provider/Create" => create(CreateRequest) -> CreateResponse;
    "/hemmer.provider.v1.Provider/Read" => read(ReadRequest) -> ReadResponse;
    "/hemmer.provider.v1.Provider/Update" => update(UpdateRequest) -> UpdateResponse;
    "/hemmer.provider.v1.Provider/Delete" => delete(DeleteRequest) -> DeleteResponse;
    "/hemmer.provider.v1.Provider/ImportResourceState" => import_resource_state(ImportResourceStateRequest) -> ImportResourceStateResponse;
    "/hemmer.provider.v1.Provider/ValidateDataSourceConfig" => validate_data_source_config(ValidateDataSourceConfigRequest) -> ValidateDataSourceConfigResponse;
    "/hemmer.provider.v1.Provider/ReadDataSource" => read_data_source(ReadDataSourceRequest) -> ReadDataSourceResponse;
}

/// Tower service routing protocol requests to a [`Provider`] implementation.
#[derive(Debug)]
pub struct ProviderServer<T> {
    inner: Arc<T>,
}

impl<T> ProviderServer<T> {
    /// Wrap a handler.
    pub fn new(inner: T) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    /// Wrap an already shared handler.
    pub fn from_arc(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T> Clone for ProviderServer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> tonic::server::NamedService for ProviderServer<T> {
    const NAME: &'static str = SERVICE_NAME;
}
