//! Request handler that forwards client requests to the host.

use axum::http::StatusCode;

use crate::host::{HostClient, HostError};
use crate::http::{HandlerRequest, Reply, RequestHandler};
use crate::observability::metrics;
use crate::proxy::rewrite::{self, ReportedAddresses};

/// How a request is forwarded and what happens to the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Text, with the discovery fields rewritten.
    ServerInfo,
    /// Binary PNG, unmodified.
    AppAsset,
    /// Text, unmodified.
    PassThrough,
}

impl Category {
    pub fn of(path_and_query: &str) -> Self {
        if path_and_query.starts_with("/serverinfo") {
            Category::ServerInfo
        } else if path_and_query.starts_with("/appasset") {
            Category::AppAsset
        } else {
            Category::PassThrough
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ServerInfo => "serverinfo",
            Category::AppAsset => "appasset",
            Category::PassThrough => "passthrough",
        }
    }
}

/// Forwards every request to the host's HTTPS port as the relay's client identity.
#[derive(Clone)]
pub struct ProxyHandler {
    host: HostClient,
    reported: ReportedAddresses,
}

impl ProxyHandler {
    pub fn new(host: HostClient, reported: ReportedAddresses) -> Self {
        Self { host, reported }
    }

    async fn forward(&self, category: Category, target: &str) -> Result<Reply, HostError> {
        match category {
            Category::ServerInfo => {
                let info = self.host.forward_text(target).await?;
                let rewritten = rewrite::rewrite_server_info(&info, &self.reported);
                tracing::debug!(body = %rewritten, "Rewrote server info");
                Ok(Reply::text(rewritten))
            }
            Category::AppAsset => {
                let asset = self.host.forward_bytes(target).await?;
                tracing::debug!(bytes = asset.len(), "App asset received");
                Ok(Reply::png(asset))
            }
            Category::PassThrough => {
                let body = self.host.forward_text(target).await?;
                tracing::debug!(body = %body, "Passing host response through unmodified");
                Ok(Reply::text(body))
            }
        }
    }
}

impl RequestHandler for ProxyHandler {
    async fn handle(&self, request: HandlerRequest) -> Reply {
        let target = request.path_and_query();
        let category = Category::of(&target);

        tracing::info!(
            connection_id = %request.connection,
            method = %request.method,
            path = %request.path,
            category = category.as_str(),
            "Proxying request"
        );

        let reply = match self.forward(category, &target).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    connection_id = %request.connection,
                    path = %request.path,
                    error = %e,
                    "Forwarding to host failed"
                );
                error_reply(&e)
            }
        };

        metrics::record_proxy_request(category.as_str(), reply.status.as_u16());
        reply
    }
}

/// Status for a failed forward.
pub fn error_status(err: &HostError) -> StatusCode {
    match err {
        HostError::NotFound { .. } => StatusCode::NOT_FOUND,
        HostError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        HostError::Status { code, .. } => u16::try_from(*code)
            .ok()
            .filter(|code| (400..=599).contains(code))
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::BAD_GATEWAY),
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_reply(err: &HostError) -> Reply {
    Reply::error(error_status(err), err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_by_prefix() {
        assert_eq!(Category::of("/serverinfo?uniqueid=1"), Category::ServerInfo);
        assert_eq!(Category::of("/serverinfo"), Category::ServerInfo);
        assert_eq!(Category::of("/appasset?appid=1&AssetType=2"), Category::AppAsset);
        assert_eq!(Category::of("/applist"), Category::PassThrough);
        assert_eq!(Category::of("/launch?serverinfo=1"), Category::PassThrough);
    }

    #[test]
    fn maps_errors_to_statuses() {
        let not_found = HostError::NotFound { url: "u".into() };
        assert_eq!(error_status(&not_found), StatusCode::NOT_FOUND);

        let timeout = HostError::Timeout { url: "u".into() };
        assert_eq!(error_status(&timeout), StatusCode::GATEWAY_TIMEOUT);

        let status = |code| HostError::Status {
            code,
            message: String::new(),
        };
        assert_eq!(error_status(&status(401)), StatusCode::UNAUTHORIZED);
        assert_eq!(error_status(&status(418)), StatusCode::IM_A_TEAPOT);
        assert_eq!(error_status(&status(503)), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error_status(&status(-1)), StatusCode::BAD_GATEWAY);
        assert_eq!(error_status(&status(200)), StatusCode::BAD_GATEWAY);

        assert_eq!(error_status(&HostError::Xml("bad".into())), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn error_reply_is_plain_text() {
        let reply = error_reply(&HostError::NotFound { url: "https://h/x".into() });
        assert_eq!(reply.content_type, "text/plain");
        assert!(String::from_utf8(reply.body).unwrap().contains("not found"));
    }
}
