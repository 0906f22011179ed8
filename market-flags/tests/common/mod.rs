use std::net::SocketAddr;
use std::sync::Arc;

use common_blob_store::BlobClient;
use reqwest::header::CONTENT_TYPE;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use market_flags::config::Config;
use market_flags::server::serve_with_client;

pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn for_config_and_client(
        config: Config,
        client: Arc<dyn BlobClient + Send + Sync>,
    ) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            serve_with_client(config, client, listener, async move {
                notify.notified().await
            })
            .await
        });
        ServerHandle { addr, shutdown }
    }

    pub async fn send_flags_request<T: Into<reqwest::Body>>(&self, body: T) -> reqwest::Response {
        let client = reqwest::Client::new();
        client
            .post(format!("http://{:?}/flags", self.addr))
            .body(body)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .expect("failed to send request")
    }

    pub async fn send_preflight_request(&self) -> reqwest::Response {
        let client = reqwest::Client::new();
        client
            .request(reqwest::Method::OPTIONS, format!("http://{:?}/", self.addr))
            .header("Origin", "https://shop.example.com")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("failed to send request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        reqwest::get(format!("http://{:?}{}", self.addr, path))
            .await
            .expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}

pub fn assert_cors_headers(res: &reqwest::Response) {
    let headers = res.headers();
    assert_eq!(
        headers.get("access-control-allow-origin").unwrap(),
        "https://shop.example.com"
    );
    assert_eq!(
        headers.get("access-control-allow-methods").unwrap(),
        "POST, GET, OPTIONS"
    );
    assert_eq!(
        headers.get("access-control-allow-headers").unwrap(),
        "Content-Type"
    );
}
