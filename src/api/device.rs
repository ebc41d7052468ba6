//! 请求设备信息（仅用于日志）

use std::fmt::Display;
use std::net::SocketAddr;

use axum::http::HeaderMap;
use serde::Deserialize;

/// 设备可通过查询参数上报 ID
#[derive(Debug, Default, Deserialize)]
pub struct DeviceQuery {
    pub device_id: Option<String>,
}

/// 发起请求的设备
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub ip: String,
    pub user_agent: String,
}

impl DeviceInfo {
    /// 设备 ID 优先取查询参数 `device_id`，其次取请求头 `x-device-id`
    pub fn from_request(
        query: &DeviceQuery,
        headers: &HeaderMap,
        remote: Option<SocketAddr>,
    ) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };

        Self {
            device_id: query
                .device_id
                .clone()
                .filter(|v| !v.is_empty())
                .or_else(|| header("x-device-id"))
                .unwrap_or_else(|| "unknown".to_string()),
            ip: remote
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            user_agent: header("user-agent").unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Device ID: {}, IP: {}, User-Agent: {}",
            self.device_id, self.ip, self.user_agent
        )
    }
}
