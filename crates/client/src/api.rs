use async_trait::async_trait;
use habitkit_core::{ActionRequest, ApiError, Challenge, Party, Payload, RawTask, Tag, User};
use serde_json::Value;

use crate::client::RateLimitedClient;
use crate::config::{ClientConfig, ConfigError};
use crate::endpoints::{self, action_endpoint};

/// Resource fetchers and mutations the data store depends on.
#[async_trait]
pub trait HabitApi: Send + Sync {
    async fn user(&self) -> Result<User, ApiError>;
    async fn content(&self) -> Result<Value, ApiError>;
    async fn tags(&self) -> Result<Vec<Tag>, ApiError>;
    /// `None` when the user is not in a party.
    async fn party(&self) -> Result<Option<Party>, ApiError>;
    /// One page (0-based) of the user's challenges; empty past the end.
    async fn challenges_page(&self, page: u32) -> Result<Vec<Challenge>, ApiError>;
    async fn tasks(&self) -> Result<Vec<RawTask>, ApiError>;
    async fn perform(&self, action: &ActionRequest) -> Result<Payload, ApiError>;
}

/// [`HabitApi`] over HTTP.
#[derive(Debug)]
pub struct HabiticaClient {
    client: RateLimitedClient,
}

impl HabiticaClient {
    /// Builds the HTTP client from `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: RateLimitedClient::new(config)?,
        })
    }

    pub fn from_client(client: RateLimitedClient) -> Self {
        Self { client }
    }

    /// Underlying client, e.g. for its dispatch counter.
    pub fn inner(&self) -> &RateLimitedClient {
        &self.client
    }
}

#[async_trait]
impl HabitApi for HabiticaClient {
    async fn user(&self) -> Result<User, ApiError> {
        self.client.get(endpoints::USER, &[]).await?.decode()
    }

    async fn content(&self) -> Result<Value, ApiError> {
        Ok(self.client.get(endpoints::CONTENT, &[]).await?.into_value())
    }

    async fn tags(&self) -> Result<Vec<Tag>, ApiError> {
        self.client.get(endpoints::TAGS, &[]).await?.decode()
    }

    async fn party(&self) -> Result<Option<Party>, ApiError> {
        match self.client.get(endpoints::PARTY, &[]).await {
            Ok(payload) => payload.decode(),
            Err(ApiError::HttpStatus { status: 404, .. }) => {
                tracing::debug!("user has no party");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn challenges_page(&self, page: u32) -> Result<Vec<Challenge>, ApiError> {
        let page = page.to_string();
        self.client
            .get(endpoints::USER_CHALLENGES, &[("page", page.as_str())])
            .await?
            .decode()
    }

    async fn tasks(&self) -> Result<Vec<RawTask>, ApiError> {
        self.client.get(endpoints::USER_TASKS, &[]).await?.decode()
    }

    async fn perform(&self, action: &ActionRequest) -> Result<Payload, ApiError> {
        let ep = action_endpoint(action);
        tracing::debug!(action = action.name(), path = %ep.path(), "performing action");
        self.client
            .send_segments(
                ep.method.clone(),
                &ep.segment_refs(),
                ep.body.as_ref(),
                &ep.query_pairs(),
            )
            .await
    }
}
