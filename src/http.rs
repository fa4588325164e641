use std::time::{Duration, Instant};

use reqwest::{redirect, Certificate, Client, Method, NoProxy, Proxy};

use crate::config::Config;
use crate::error::PortalError;

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: u16,
    pub body: Vec<u8>,
    pub duration_ms: u64,
}

impl ResponseData {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Build the single client shared by every request of a run.
pub fn build_client(config: &Config) -> Result<Client, PortalError> {
    let mut builder = Client::builder();

    if config.http.timeout > 0 {
        builder = builder.timeout(Duration::from_secs(config.http.timeout));
    }

    builder = builder.redirect(if config.http.follow_redirects {
        redirect::Policy::limited(config.http.max_redirects as usize)
    } else {
        redirect::Policy::none()
    });

    if let Some(ref url) = config.proxy.url {
        let proxy = Proxy::all(url.as_str())
            .map_err(|e| PortalError::Config(format!("proxy.url = \"{}\": {}", url, e)))?
            .no_proxy(config.proxy.no_proxy.as_deref().and_then(NoProxy::from_string));
        builder = builder.proxy(proxy);
    }

    if !config.ssl.verify {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(ref path) = config.ssl.ca_cert {
        let pem = std::fs::read(path).map_err(|e| {
            PortalError::Config(format!("ssl.ca_cert = \"{}\": {}", path.display(), e))
        })?;
        let cert = Certificate::from_pem(&pem).map_err(|e| {
            PortalError::Config(format!("ssl.ca_cert = \"{}\": {}", path.display(), e))
        })?;
        builder = builder.add_root_certificate(cert);
    }

    builder
        .build()
        .map_err(|e| PortalError::Config(format!("failed to create HTTP client: {}", e)))
}

pub async fn send_request(
    client: &Client,
    method: Method,
    url: &str,
    headers: &[(&str, String)],
    body: Option<String>,
) -> Result<ResponseData, String> {
    let start = Instant::now();

    let sends_body = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(&method);

    let mut builder = client.request(method, url);
    for (key, value) in headers {
        builder = builder.header(*key, value.as_str());
    }

    if let Some(body) = body.filter(|b| !b.is_empty() && sends_body) {
        builder = builder.body(body);
    }

    let response = builder.send().await.map_err(format_request_error)?;
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(format_request_error)?.to_vec();

    Ok(ResponseData {
        status,
        body,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

pub fn format_request_error(err: reqwest::Error) -> String {
    if err.is_timeout() {
        return "Request timed out".to_string();
    }
    if err.is_connect() {
        if let Some(host) = err.url().and_then(|url| url.host_str()) {
            return format!("Connection failed: {}", host);
        }
        return "Connection failed".to_string();
    }
    if err.is_builder() {
        return format!("Invalid URL: {}", err);
    }
    if err.is_redirect() {
        return "Too many redirects".to_string();
    }
    if err.is_decode() || err.is_body() {
        return "Failed to read response body".to_string();
    }
    format!("Request failed: {}", err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_request_passes_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/echo"))
            .and(header("X-Apigee-Org", "acme"))
            .and(body_string("{\"a\":1}"))
            .respond_with(ResponseTemplate::new(201).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = build_client(&Config::default()).unwrap();
        let res = send_request(
            &client,
            Method::PUT,
            &format!("{}/echo", server.uri()),
            &[("X-Apigee-Org", "acme".to_string())],
            Some("{\"a\":1}".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(res.status, 201);
        assert!(res.is_success());
        assert_eq!(res.body, b"ok");
    }

    #[tokio::test]
    async fn test_get_drops_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plain"))
            .and(body_string(""))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = build_client(&Config::default()).unwrap();
        let res = send_request(
            &client,
            Method::GET,
            &format!("{}/plain", server.uri()),
            &[],
            Some("ignored".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(res.status, 200);
    }
}
