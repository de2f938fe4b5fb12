pub mod models;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::TelegramConfig;
use crate::error::{BridgeError, Result};
use models::{ApiResponse, File, GetUpdates, Message, SendMessage, SendPoll, Update, User};

const ERROR_BODY_MAX_CHARS: usize = 256;

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn get_me(&self) -> Result<User>;
    async fn get_updates(&self, query: &GetUpdates) -> Result<Vec<Update>>;
    async fn send_message(&self, request: &SendMessage) -> Result<Message>;
    async fn send_poll(&self, request: &SendPoll) -> Result<Message>;
    async fn get_file(&self, file_id: &str) -> Result<File>;
    async fn download_file(&self, file_path: &str) -> Result<Vec<u8>>;
}

pub struct TelegramClient {
    http: reqwest::Client,
    api_base_url: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone().unwrap_or_default(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base_url, self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.api_base_url,
            self.bot_token,
            file_path.trim_start_matches('/')
        )
    }

    async fn call_get<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http
            .get(self.method_url(method))
            .query(query)
            .send()
            .await?;
        decode_envelope(method, response).await
    }

    async fn call_post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;
        decode_envelope(method, response).await
    }
}

#[async_trait]
impl ChatApi for TelegramClient {
    async fn get_me(&self) -> Result<User> {
        self.call_get("getMe", &[]).await
    }

    async fn get_updates(&self, query: &GetUpdates) -> Result<Vec<Update>> {
        let mut params = vec![("timeout", query.timeout_secs.to_string())];
        if query.offset != 0 {
            params.push(("offset", query.offset.to_string()));
        }
        if query.limit != 0 {
            params.push(("limit", query.limit.to_string()));
        }
        self.call_get("getUpdates", &params).await
    }

    async fn send_message(&self, request: &SendMessage) -> Result<Message> {
        self.call_post("sendMessage", request).await
    }

    async fn send_poll(&self, request: &SendPoll) -> Result<Message> {
        self.call_post("sendPoll", request).await
    }

    async fn get_file(&self, file_id: &str) -> Result<File> {
        self.call_post("getFile", &serde_json::json!({ "file_id": file_id }))
            .await
    }

    async fn download_file(&self, file_path: &str) -> Result<Vec<u8>> {
        let response = self.http.get(self.file_url(file_path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Api {
                method: "downloadFile".to_owned(),
                description: format!("status {}", status.as_u16()),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

async fn decode_envelope<T: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    let envelope: ApiResponse = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(err) if status.is_success() => {
            return Err(BridgeError::Decode(format!(
                "telegram {method} invalid JSON: {err}"
            )))
        }
        Err(_) => {
            return Err(BridgeError::Api {
                method: method.to_owned(),
                description: format!(
                    "status {}: {}",
                    status.as_u16(),
                    truncate_chars(&body, ERROR_BODY_MAX_CHARS)
                ),
            })
        }
    };
    if !envelope.ok {
        return Err(BridgeError::Api {
            method: method.to_owned(),
            description: envelope
                .description
                .unwrap_or_else(|| "telegram API returned ok=false".to_owned()),
        });
    }
    debug!("telegram {method} ok");
    let result = envelope.result.unwrap_or(Value::Null);
    serde_json::from_value(result)
        .map_err(|err| BridgeError::Decode(format!("telegram {method} result: {err}")))
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ChatApi, TelegramClient};
    use crate::config::TelegramConfig;
    use crate::error::BridgeError;
    use crate::telegram::models::{GetUpdates, SendMessage};

    fn client_for(server: &MockServer) -> TelegramClient {
        let config = TelegramConfig {
            bot_token: Some("123:abc".to_owned()),
            api_base_url: format!("{}/", server.uri()),
            ..TelegramConfig::default()
        };
        TelegramClient::new(&config).expect("client")
    }

    #[tokio::test]
    async fn get_updates_sends_offset_and_timeout_and_skips_zero_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bot123:abc/getUpdates"))
            .and(query_param("offset", "41"))
            .and(query_param("timeout", "30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    { "update_id": 41, "message": { "message_id": 1, "chat": { "id": 7, "type": "private" }, "text": "hi" } },
                    { "update_id": 42 }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let updates = client
            .get_updates(&GetUpdates {
                offset: 41,
                limit: 0,
                timeout_secs: 30,
            })
            .await
            .expect("getUpdates should succeed");
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].update_id, 42);

        let requests = server.received_requests().await.expect("recorded requests");
        assert!(requests[0]
            .url
            .query_pairs()
            .all(|(key, _)| key != "limit"));
    }

    #[tokio::test]
    async fn send_message_surfaces_api_description_on_ok_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": 7, "reply_to_message_id": 3 })))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .send_message(&SendMessage::reply(7, 3, "hello"))
            .await
            .expect_err("ok=false must be an error");
        match err {
            BridgeError::Api {
                method,
                description,
            } => {
                assert_eq!(method, "sendMessage");
                assert_eq!(description, "Bad Request: chat not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn download_file_uses_file_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file/bot123:abc/documents/file_1.torrent"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"d8:announce".to_vec()))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let bytes = client
            .download_file("documents/file_1.torrent")
            .await
            .expect("download should succeed");
        assert_eq!(bytes, b"d8:announce".to_vec());
    }
}
