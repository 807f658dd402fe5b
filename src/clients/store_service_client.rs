use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::db::store::SessionStore;
use crate::error::StoreError;
use crate::models::{Participant, RoomCheckpoint, RoomRecord};

/// Room store backed by the persistence service's HTTP API
#[derive(Debug)]
pub struct StoreServiceClient {
    client: Client,
    base_url: String,
    jwt_secret: Option<String>,
    service_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "type")]
    type_: String,
    exp: usize,
}

impl StoreServiceClient {
    pub fn new(base_url: &str, jwt_secret: Option<String>, service_name: String) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            jwt_secret,
            service_name,
        })
    }

    fn room_url(&self, room_id: &str) -> String {
        format!("{}/api/rooms/{}", self.base_url, room_id)
    }

    fn generate_token(&self, secret: &str) -> Result<String, StoreError> {
        let expiration = Utc::now()
            .checked_add_signed(Duration::seconds(60)) // 1 minute expiration
            .ok_or_else(|| StoreError::Unavailable("token expiry out of range".to_string()))?
            .timestamp();

        let claims = Claims {
            sub: self.service_name.clone(),
            type_: "service".to_string(),
            exp: expiration as usize,
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| StoreError::Unavailable(format!("failed to sign service token: {}", e)))
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, StoreError> {
        match &self.jwt_secret {
            Some(secret) => {
                let token = self.generate_token(secret)?;
                Ok(request.header("Authorization", format!("Bearer {}", token)))
            }
            None => Ok(request),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, StoreError> {
        self.send_allowing(request, None).await
    }

    /// Like `send`, but `tolerated` is passed through as a non-error status
    async fn send_allowing(
        &self,
        request: RequestBuilder,
        tolerated: Option<StatusCode>,
    ) -> Result<reqwest::Response, StoreError> {
        let response = self.authorized(request)?.send().await?;
        let status = response.status();
        if !status.is_success() && Some(status) != tolerated {
            error!("Store service answered {}", status);
            return Err(StoreError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl SessionStore for StoreServiceClient {
    fn backend(&self) -> &'static str {
        "store-service"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let url = format!("{}/", self.base_url);
        self.send(self.client.get(&url)).await?;
        Ok(())
    }

    async fn fetch_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError> {
        let response = self
            .send_allowing(self.client.get(self.room_url(room_id)), Some(StatusCode::NOT_FOUND))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Store service has no room {}", room_id);
            return Ok(None);
        }
        Ok(Some(response.json::<RoomRecord>().await?))
    }

    async fn create_room(&self, record: &RoomRecord) -> Result<(), StoreError> {
        let url = format!("{}/api/rooms", self.base_url);
        // An existing room is left untouched
        self.send_allowing(self.client.post(&url).json(record), Some(StatusCode::CONFLICT)).await?;
        Ok(())
    }

    async fn upsert_room(&self, checkpoint: &RoomCheckpoint) -> Result<(), StoreError> {
        let url = format!("{}/state", self.room_url(&checkpoint.room_id));
        // The service answers 409 when it already holds a newer revision
        self.send_allowing(self.client.put(&url).json(checkpoint), Some(StatusCode::CONFLICT))
            .await?;
        Ok(())
    }

    async fn add_participant(&self, room_id: &str, participant: &Participant) -> Result<(), StoreError> {
        let url = format!("{}/participants/{}", self.room_url(room_id), participant.connection_id);
        self.send(self.client.put(&url).json(participant)).await?;
        Ok(())
    }

    async fn remove_participant(&self, room_id: &str, connection_id: &str) -> Result<(), StoreError> {
        let url = format!("{}/participants/{}", self.room_url(room_id), connection_id);
        // Already gone counts as removed
        self.send_allowing(self.client.delete(&url), Some(StatusCode::NOT_FOUND)).await?;
        Ok(())
    }

    async fn clear_participants(&self, room_id: &str) -> Result<(), StoreError> {
        let url = format!("{}/participants", self.room_url(room_id));
        self.send_allowing(self.client.delete(&url), Some(StatusCode::NOT_FOUND)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    #[test]
    fn service_token_carries_service_claims() {
        let client = StoreServiceClient::new(
            "http://store.local/",
            Some("secret".to_string()),
            "colabri-room".to_string(),
        )
        .unwrap();
        assert_eq!(client.room_url("r1"), "http://store.local/api/rooms/r1");

        let token = client.generate_token("secret").unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(data.claims.sub, "colabri-room");
        assert_eq!(data.claims.type_, "service");
    }
}
