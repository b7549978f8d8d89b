use std::time::Duration;

use url::Url;

/// Speaks the proxy callback handshake described in SPEC_FULL.md §4.4: an HTTPS-only GET to the
/// service-supplied `pgtUrl`, carrying `pgtId` and `pgtIou` as query parameters, with a bounded
/// timeout and a bare 2xx as the only success signal.
#[derive(Clone)]
pub struct ProxyCallbackClient {
    client: reqwest::Client,
}

impl ProxyCallbackClient {
    pub fn new(timeout_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .expect("reqwest client builds with static TLS config");
        Self { client }
    }

    /// A non-https `pgtUrl` is not an error, it just means no PGT is issued (§4.4 step 1).
    pub fn is_https(pgt_url: &str) -> bool {
        Url::parse(pgt_url)
            .map(|u| u.scheme() == "https")
            .unwrap_or(false)
    }

    /// Returns whether the callback was acknowledged. Any network failure, timeout, non-2xx
    /// status, or malformed `pgtUrl` counts as "not delivered" — the caller must not create a PGT.
    pub async fn deliver(&self, pgt_url: &str, pgt_id: &str, pgt_iou: &str) -> bool {
        let mut url = match Url::parse(pgt_url) {
            Ok(url) => url,
            Err(_) => return false,
        };
        url.query_pairs_mut()
            .append_pair("pgtId", pgt_id)
            .append_pair("pgtIou", pgt_iou);

        match self.client.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_urls_are_rejected() {
        assert!(!ProxyCallbackClient::is_https("http://proxy.example.com/callback"));
    }

    #[test]
    fn https_urls_are_accepted() {
        assert!(ProxyCallbackClient::is_https("https://proxy.example.com/callback"));
    }

    #[test]
    fn malformed_urls_are_rejected() {
        assert!(!ProxyCallbackClient::is_https("not a url"));
    }
}
