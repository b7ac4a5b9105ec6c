// SPDX-License-Identifier: MIT OR Apache-2.0
//! Optional HTTP negotiation step and WebSocket URL construction.

use async_trait::async_trait;
use url::Url;

use crate::error::TransportError;

/// The outcome of a successful negotiation.
#[derive(Debug, Clone)]
pub struct NegotiatedConnection {
    /// Server-assigned connection identifier.
    pub connection_id: String,
    /// Server-assigned connection token, forwarded as a query parameter.
    pub connection_token: String,
    /// The URL to open the WebSocket against.
    pub url: Url,
}

/// Performs (or skips) the optional `/negotiate` handshake before the raw
/// WebSocket connects.
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Negotiate a connection for `base_url`. Implementations that don't
    /// need negotiation should fall through to
    /// [`direct_websocket_url`] and report it here.
    async fn negotiate(
        &self,
        base_url: &Url,
        bearer_token: Option<&str>,
    ) -> Result<NegotiatedConnection, TransportError>;
}

/// Skips negotiation entirely: the socket URL is `base_url` with its
/// scheme translated to `ws`/`wss` and the bearer token (if any) attached
/// as an `access_token` query parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNegotiation;

#[async_trait]
impl Negotiator for NoNegotiation {
    async fn negotiate(
        &self,
        base_url: &Url,
        bearer_token: Option<&str>,
    ) -> Result<NegotiatedConnection, TransportError> {
        Ok(NegotiatedConnection {
            connection_id: String::new(),
            connection_token: String::new(),
            url: direct_websocket_url(base_url, bearer_token)?,
        })
    }
}

/// An HTTP-backed negotiator: `POST {base_url}/negotiate`, optionally with
/// an `Authorization: Bearer` header, expecting a JSON body of
/// `{connectionId, connectionToken, url}`. On any failure, falls back to
/// [`direct_websocket_url`] rather than failing the connection outright —
/// negotiation is an optimization, not a requirement.
pub struct HttpNegotiator {
    client: reqwest::Client,
}

impl HttpNegotiator {
    /// Build a negotiator using `client` for the `/negotiate` request.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(serde::Deserialize)]
struct NegotiateResponse {
    #[serde(rename = "connectionId")]
    connection_id: String,
    #[serde(rename = "connectionToken")]
    connection_token: String,
    url: String,
}

#[async_trait]
impl Negotiator for HttpNegotiator {
    async fn negotiate(
        &self,
        base_url: &Url,
        bearer_token: Option<&str>,
    ) -> Result<NegotiatedConnection, TransportError> {
        let negotiate_url = base_url
            .join("negotiate")
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        let mut request = self.client.post(negotiate_url);
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) if response.status().is_success() => response,
            _ => {
                return Ok(NegotiatedConnection {
                    connection_id: String::new(),
                    connection_token: String::new(),
                    url: direct_websocket_url(base_url, bearer_token)?,
                });
            }
        };

        match response.json::<NegotiateResponse>().await {
            Ok(body) => {
                let mut url = Url::parse(&body.url).map_err(|e| TransportError::Protocol(e.to_string()))?;
                if let Some(token) = bearer_token {
                    url.query_pairs_mut().append_pair("access_token", token);
                }
                Ok(NegotiatedConnection {
                    connection_id: body.connection_id,
                    connection_token: body.connection_token,
                    url,
                })
            }
            Err(_) => Ok(NegotiatedConnection {
                connection_id: String::new(),
                connection_token: String::new(),
                url: direct_websocket_url(base_url, bearer_token)?,
            }),
        }
    }
}

/// Translate `http`/`https` to `ws`/`wss` and, if `bearer_token` is set,
/// attach it as an `access_token` query parameter.
pub fn direct_websocket_url(base_url: &Url, bearer_token: Option<&str>) -> Result<Url, TransportError> {
    let mut url = base_url.clone();
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => other,
    }
    .to_string();
    url.set_scheme(&scheme)
        .map_err(|()| TransportError::Protocol(format!("cannot translate scheme {}", base_url.scheme())))?;
    if let Some(token) = bearer_token {
        url.query_pairs_mut().append_pair("access_token", token);
    }
    Ok(url)
}
