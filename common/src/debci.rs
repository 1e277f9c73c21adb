use crate::errors::*;
use crate::http;
use crate::query::{CiResult, CiStatus};
use reqwest::StatusCode;
use url::Url;

const SUITE: &str = "unstable";

/// Pool style prefix, `libfoo` lives in `libf`, `foo` in `f`
pub fn pool_prefix(package: &str) -> &str {
    let len = if package.starts_with("lib") && package.len() > 3 {
        4
    } else {
        1
    };
    package.get(..len).unwrap_or(package)
}

pub struct Client {
    endpoint: Url,
    client: http::Client,
}

impl Client {
    pub fn new(endpoint: &str) -> Result<Client> {
        let endpoint = endpoint
            .parse::<Url>()
            .with_context(|| anyhow!("Failed to parse debci endpoint as url: {:?}", endpoint))?;
        if endpoint.cannot_be_a_base() {
            bail!("Given debci url cannot be base");
        }
        Ok(Client {
            endpoint,
            client: http::client()?,
        })
    }

    pub fn latest_url(&self, package: &str, architecture: &str) -> Url {
        let mut url = self.endpoint.clone();
        {
            // checked in the constructor
            let mut path = url.path_segments_mut().expect("Url cannot be base");
            path.pop_if_empty().extend(&[
                "data",
                "packages",
                SUITE,
                architecture,
                pool_prefix(package),
                package,
                "latest.json",
            ]);
        }
        url
    }
}

impl CiStatus for Client {
    fn status_for(&self, package: &str, architecture: &str) -> Result<Option<CiResult>> {
        let url = self.latest_url(package, architecture);
        debug!("Fetching debci status from {}", url);
        let res = self.client.get(url).send()?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let result = res
            .error_for_status()?
            .json()
            .with_context(|| anyhow!("Failed to parse debci status of {:?}", package))?;
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_prefix() {
        assert_eq!(pool_prefix("foo"), "f");
        assert_eq!(pool_prefix("libfoo"), "libf");
        assert_eq!(pool_prefix("lib"), "l");
        assert_eq!(pool_prefix(""), "");
    }

    #[test]
    fn test_latest_url() {
        let client = Client::new("https://ci.debian.net/").unwrap();
        let url = client.latest_url("libfoo", "amd64");
        assert_eq!(
            url.as_str(),
            "https://ci.debian.net/data/packages/unstable/amd64/libf/libfoo/latest.json"
        );
    }

    #[test]
    fn test_decode_result() {
        let json = r#"{"run_id": 1, "package": "foo", "version": "1.0-1", "status": "pass"}"#;
        let result: CiResult = serde_json::from_str(json).unwrap();
        assert!(result.is_pass());
        assert_eq!(result.version.as_deref(), Some("1.0-1"));
    }
}
