use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

use super::SandboxError;
use super::types::{
    ApiResponse, DataEntry, LiveStatus, LiveStatusBody, MessageBody, ValueBody,
};

/// Client for the sandbox orchestration API, bound to one sandbox.
#[derive(Clone)]
pub struct SandboxClient {
    client: reqwest::Client,
    base_url: String,
    sandbox_id: String,
}

impl SandboxClient {
    pub fn new(
        base_url: impl Into<String>,
        token: &str,
        sandbox_id: impl Into<String>,
    ) -> Result<Self, SandboxError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", token);
        let header_value =
            HeaderValue::from_str(&auth_value).map_err(|_| SandboxError::Auth {
                message: "Invalid token format".to_string(),
            })?;
        headers.insert(AUTHORIZATION, header_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(SandboxError::Network)?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            sandbox_id: sandbox_id.into(),
        })
    }

    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    /// Reads one sandbox data entry. A missing key is `Ok(None)`.
    pub async fn get_data(&self, key: &str) -> Result<Option<String>, SandboxError> {
        let url = self.url(&["data", key])?;
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: ApiResponse<DataEntry> = parse_response(response).await?;
        Ok(body.result.map(|entry| entry.value))
    }

    pub async fn set_data(&self, key: &str, value: &str) -> Result<(), SandboxError> {
        let url = self.url(&["data", key])?;
        let response = self.client.put(url).json(&ValueBody { value }).send().await?;
        self.expect_success(response).await
    }

    pub async fn set_live_status(
        &self,
        service: &str,
        status: LiveStatus,
        description: &str,
    ) -> Result<(), SandboxError> {
        let url = self.url(&["services", service, "live-status"])?;
        let body = LiveStatusBody {
            status: status.to_string(),
            description,
        };
        let response = self.client.put(url).json(&body).send().await?;
        self.expect_success(response).await
    }

    pub async fn write_message(&self, message: &str) -> Result<(), SandboxError> {
        let url = self.url(&["messages"])?;
        let response = self
            .client
            .post(url)
            .json(&MessageBody { message })
            .send()
            .await?;
        self.expect_success(response).await
    }

    pub async fn set_attribute(
        &self,
        service: &str,
        name: &str,
        value: &str,
    ) -> Result<(), SandboxError> {
        let url = self.url(&["services", service, "attributes", name])?;
        let response = self.client.put(url).json(&ValueBody { value }).send().await?;
        self.expect_success(response).await
    }

    async fn expect_success(&self, response: reqwest::Response) -> Result<(), SandboxError> {
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SandboxError::SandboxNotFound {
                sandbox_id: self.sandbox_id.clone(),
            });
        }
        let _: ApiResponse<serde_json::Value> = parse_response(response).await?;
        Ok(())
    }

    // NOTE: Segments are percent-encoded, attribute names routinely contain spaces
    fn url(&self, segments: &[&str]) -> Result<Url, SandboxError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| SandboxError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SandboxError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push("sandboxes")
            .push(&self.sandbox_id)
            .extend(segments);
        Ok(url)
    }
}

async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<ApiResponse<T>, SandboxError> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SandboxError::Auth {
            message: format!("API rejected credentials ({})", status.as_u16()),
        });
    }

    let body: ApiResponse<T> = response.json().await.map_err(|e| SandboxError::Api {
        status: status.as_u16(),
        message: format!("Failed to parse response: {}", e),
    })?;

    if !body.success {
        return Err(SandboxError::Api {
            status: status.as_u16(),
            message: body.first_error().unwrap_or("Unknown error").to_string(),
        });
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_segments() {
        let client = SandboxClient::new("http://localhost:9000/api", "t", "sb 1").unwrap();
        assert_eq!(client.sandbox_id(), "sb 1");
        let url = client
            .url(&["services", "tf", "attributes", "Terraform Outputs"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9000/api/sandboxes/sb%201/services/tf/attributes/Terraform%20Outputs"
        );
    }

    #[test]
    fn test_url_trailing_slash_base() {
        let client = SandboxClient::new("http://localhost:9000/", "t", "sb1").unwrap();
        let url = client.url(&["messages"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/sandboxes/sb1/messages");
    }

    #[test]
    fn test_invalid_base_url() {
        let client = SandboxClient::new("not a url", "t", "sb1").unwrap();
        assert!(matches!(
            client.url(&["messages"]),
            Err(SandboxError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_invalid_token_format() {
        let result = SandboxClient::new("http://localhost", "bad\ntoken", "sb1");
        assert!(matches!(result, Err(SandboxError::Auth { .. })));
    }
}
