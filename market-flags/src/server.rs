use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as AwsS3SdkClient;
use common_blob_store::{BlobClient, S3BlobClient};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::flags::flag_store::FlagStoreLoader;
use crate::router;

/// Builds the S3 client shared by every request. A custom endpoint switches to path-style
/// addressing, which MinIO and GCS interop both expect.
pub async fn build_s3_client(config: &Config) -> AwsS3SdkClient {
    let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(config.s3_region.clone()));

    if let Some(endpoint) = config.get_s3_endpoint() {
        aws_config_builder = aws_config_builder.endpoint_url(endpoint);
    }

    let aws_config = aws_config_builder.load().await;

    let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);
    if config.get_s3_endpoint().is_some() {
        s3_config_builder = s3_config_builder.force_path_style(true);
    }

    AwsS3SdkClient::from_conf(s3_config_builder.build())
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let s3_client = build_s3_client(&config).await;
    let blob_client = Arc::new(S3BlobClient::new(s3_client));

    serve_with_client(config, blob_client, listener, shutdown).await
}

pub async fn serve_with_client<F>(
    config: Config,
    blob_client: Arc<dyn BlobClient + Send + Sync>,
    listener: TcpListener,
    shutdown: F,
) where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return;
    }

    let flag_store = Arc::new(FlagStoreLoader::from_config(blob_client, &config));

    tracing::info!(
        bucket = %config.bucket_name,
        key = %config.data_filename,
        endpoint = config.get_s3_endpoint().unwrap_or("default"),
        "serving flags"
    );

    let app = router::router(flag_store, config);

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {:?}", addr),
        Err(e) => tracing::warn!("could not read listener address: {}", e),
    }

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        tracing::error!("server error: {}", e);
    }
}
