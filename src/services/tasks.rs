// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud Tasks change feed.
//!
//! Each committed listing change becomes a Cloud Task that POSTs the change
//! back to `/tasks/listing-changed`, where the notification coordinator
//! handles it. Cloud Tasks delivers at least once, so the coordinator's
//! markers absorb duplicates.
//!
//! Uses the official google-cloud-tasks-v2 SDK.

use crate::error::AppError;
use crate::error::Result;
use crate::models::ListingChange;
use crate::services::changes::{ChangePublisher, PublishError};
use futures_util::future::BoxFuture;
use serde::Serialize;

/// Endpoint that receives queued listing changes.
pub const LISTING_CHANGED_ENDPOINT: &str = "/tasks/listing-changed";

/// Cloud Tasks client wrapper.
pub struct TasksService {
    project_id: String,
    location: String,
    queue_name: String,
    /// Base URL of this service, target of the queued requests
    service_url: String,
}

impl TasksService {
    pub fn new(project_id: &str, region: &str, service_url: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            location: region.to_string(),
            queue_name: crate::config::LISTING_EVENTS_QUEUE_NAME.to_string(),
            service_url: service_url.trim_end_matches('/').to_string(),
        }
    }

    fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        )
    }

    /// Queue a committed change for the notification coordinator.
    pub async fn queue_listing_change(&self, change: &ListingChange) -> Result<()> {
        tracing::debug!(
            listing_id = %change.listing.id,
            status = %change.listing.status,
            filled = change.listing.filled,
            "Queuing listing change"
        );
        self.queue_task(LISTING_CHANGED_ENDPOINT, change).await
    }

    /// Generic task queuing helper.
    async fn queue_task<T: Serialize>(&self, endpoint: &str, payload: &T) -> Result<()> {
        use google_cloud_tasks_v2::client::CloudTasks;
        use google_cloud_tasks_v2::model::{HttpRequest, OidcToken, Task};

        let client = CloudTasks::builder()
            .build()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks client error: {}", e)))?;

        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;

        let http_request = HttpRequest::default()
            .set_url(format!("{}{}", self.service_url, endpoint))
            .set_http_method("POST")
            .set_body(axum::body::Bytes::from(body))
            .set_headers(std::collections::HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]))
            .set_oidc_token(
                OidcToken::default()
                    .set_service_account_email(crate::config::tasks_invoker_email(
                        &self.project_id,
                    ))
                    .set_audience(self.service_url.clone()),
            );

        let task = Task::default().set_http_request(http_request);

        let _response = client
            .create_task()
            .set_parent(self.queue_path())
            .set_task(task)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks create error: {}", e)))?;

        Ok(())
    }
}

impl ChangePublisher for TasksService {
    fn publish<'a>(&'a self, change: &'a ListingChange) -> BoxFuture<'a, std::result::Result<(), PublishError>> {
        Box::pin(async move {
            self.queue_listing_change(change)
                .await
                .map_err(|e| PublishError::Enqueue(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_path_uses_listing_events_queue() {
        let service = TasksService::new("test-project", "asia-south1", "https://api.example.com/");
        assert_eq!(
            service.queue_path(),
            "projects/test-project/locations/asia-south1/queues/listing-events"
        );
        assert_eq!(service.service_url, "https://api.example.com");
    }
}
