pub mod daemon;
pub mod events;
pub mod router;
pub mod transport;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aria2Method {
    AddUri,
    AddTorrent,
}

impl Aria2Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddUri => "aria2.addUri",
            Self::AddTorrent => "aria2.addTorrent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aria2Notification {
    DownloadStart,
    DownloadPause,
    DownloadStop,
    DownloadComplete,
    DownloadError,
    BtDownloadComplete,
}

impl Aria2Notification {
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "aria2.onDownloadStart" => Some(Self::DownloadStart),
            "aria2.onDownloadPause" => Some(Self::DownloadPause),
            "aria2.onDownloadStop" => Some(Self::DownloadStop),
            "aria2.onDownloadComplete" => Some(Self::DownloadComplete),
            "aria2.onDownloadError" => Some(Self::DownloadError),
            "aria2.onBtDownloadComplete" => Some(Self::BtDownloadComplete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub id: String,
    pub method: Aria2Method,
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(method: Aria2Method, params: Vec<Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            params,
        }
    }

    pub fn add_uri(uri: &str) -> Self {
        Self::new(Aria2Method::AddUri, vec![json!([uri])])
    }

    pub fn add_torrent(torrent_base64: String) -> Self {
        Self::new(Aria2Method::AddTorrent, vec![Value::String(torrent_base64)])
    }

    // The secret is added only here, so requests parked in the cache never carry it.
    pub fn to_wire(&self, secret: Option<&str>) -> Value {
        let mut params = Vec::with_capacity(self.params.len() + 1);
        if let Some(secret) = secret.filter(|value| !value.is_empty()) {
            params.push(Value::String(format!("token:{secret}")));
        }
        params.extend(self.params.iter().cloned());
        json!({
            "jsonrpc": "2.0",
            "id": self.id,
            "method": self.method.as_str(),
            "params": params,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcResponse {
    pub fn notification_method(&self) -> Option<&str> {
        self.method
            .as_deref()
            .filter(|method| !method.trim().is_empty())
            .filter(|_| self.params.is_some())
    }

    pub fn notification_gid(&self) -> Option<&str> {
        self.params
            .as_ref()?
            .get(0)?
            .get("gid")?
            .as_str()
    }

    pub fn result_gid(&self) -> Option<&str> {
        self.result.as_ref()?.as_str()
    }
}
