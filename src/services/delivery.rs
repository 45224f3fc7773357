// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Notification delivery channels.
//!
//! Delivery is fire-and-forget: the coordinator logs failures and moves on.

use crate::models::Notification;
use anyhow::Context;
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::time::Duration;

/// Upper bound on one push gateway round trip.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

/// External channel that shows a notification to a party.
pub trait DeliveryChannel: Send + Sync {
    fn notify<'a>(&'a self, notification: &'a Notification)
        -> BoxFuture<'a, Result<(), DeliveryError>>;
}

/// Channel that only logs. Used when no push gateway is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

impl DeliveryChannel for LogDelivery {
    fn notify<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            tracing::info!(
                party_id = %notification.party_id,
                listing_id = %notification.deep_link.listing_id,
                open_as = notification.deep_link.open_as.as_str(),
                title = %notification.title,
                "Notification (log only)"
            );
            Ok(())
        })
    }
}

/// Push gateway request body.
#[derive(Serialize)]
struct PushMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: PushData<'a>,
}

#[derive(Serialize)]
struct PushData<'a> {
    listing_id: &'a str,
    open_as: &'a str,
}

/// HTTP push gateway (POSTs one JSON message per notification).
#[derive(Clone)]
pub struct PushGateway {
    http: reqwest::Client,
    url: String,
}

impl PushGateway {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_timeout(url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building push gateway HTTP client")?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let message = PushMessage {
            to: &notification.party_id,
            title: &notification.title,
            body: &notification.body,
            data: PushData {
                listing_id: &notification.deep_link.listing_id,
                open_as: notification.deep_link.open_as.as_str(),
            },
        };

        let response = self
            .http
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| DeliveryError::DeliveryFailed(e.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::DeliveryFailed(format!(
            "HTTP {}: {}",
            status, body
        )))
    }
}

impl DeliveryChannel for PushGateway {
    fn notify<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(self.send(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeepLink, Role};

    #[test]
    fn test_push_message_shape() {
        let notification = Notification {
            party_id: "u1".into(),
            title: "Seat filled".into(),
            body: "Rahim joined your carpool".into(),
            deep_link: DeepLink {
                listing_id: "l1".into(),
                open_as: Role::Driver,
            },
        };
        let message = PushMessage {
            to: &notification.party_id,
            title: &notification.title,
            body: &notification.body,
            data: PushData {
                listing_id: &notification.deep_link.listing_id,
                open_as: notification.deep_link.open_as.as_str(),
            },
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["to"], "u1");
        assert_eq!(json["data"]["open_as"], "driver");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_fails() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let gateway = PushGateway::new("http://127.0.0.1:9/push").unwrap();
        let notification = Notification {
            party_id: "u1".into(),
            title: "t".into(),
            body: "b".into(),
            deep_link: DeepLink {
                listing_id: "l1".into(),
                open_as: Role::Passenger,
            },
        };
        let result = gateway.notify(&notification).await;
        assert!(matches!(result, Err(DeliveryError::DeliveryFailed(_))));
    }

    #[tokio::test]
    async fn test_silent_gateway_times_out() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let gateway =
            PushGateway::with_timeout(format!("http://{addr}/push"), Duration::from_millis(200))
                .unwrap();
        let notification = Notification {
            party_id: "u1".into(),
            title: "t".into(),
            body: "b".into(),
            deep_link: DeepLink {
                listing_id: "l1".into(),
                open_as: Role::Driver,
            },
        };

        let result = tokio::time::timeout(Duration::from_secs(5), gateway.notify(&notification))
            .await
            .expect("client timeout should fire first");
        assert!(matches!(result, Err(DeliveryError::DeliveryFailed(_))));
        server.abort();
    }
}
