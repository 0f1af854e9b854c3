//! Caller identity extraction.
//!
//! Usage and entitlements are keyed by an authenticated user id when the
//! fronting proxy supplies one, otherwise by client IP.

use std::net::{IpAddr, SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use threadloom_core::Identity;

use crate::error::{ApiError, ApiResult};

/// Header carrying an authenticated user id set by the fronting proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Resolve the caller identity from request headers and the peer address.
///
/// Order: `x-user-id`, first `x-forwarded-for` entry, `x-real-ip`, peer IP.
pub fn resolve_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> ApiResult<Identity> {
    if let Some(user_id) = header_str(headers, USER_ID_HEADER) {
        if !user_id.trim().is_empty() {
            return Identity::new(user_id).map_err(ApiError::from);
        }
    }

    client_ip(headers, peer)
        .map(|ip| Identity::new(ip.to_string()))
        .transpose()?
        .ok_or_else(|| ApiError::missing_field("caller identity"))
}

fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    // X-Forwarded-For can contain multiple IPs, take the first one
    if let Some(forwarded_for) = header_str(headers, "x-forwarded-for") {
        if let Some(Ok(ip)) = forwarded_for.split(',').next().map(|s| s.trim().parse()) {
            return Some(ip);
        }
    }

    if let Some(Ok(ip)) = header_str(headers, "x-real-ip").map(|s| s.trim().parse()) {
        return Some(ip);
    }

    peer.map(|addr| addr.ip())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

/// Extractor for the caller's [`Identity`].
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        resolve_identity(&parts.headers, peer).map(CallerIdentity)
    }
}
