//! HTTP implementation of the provider transport

use crate::domain::message::Message;
use crate::domain::number::{NumberFlags, PhoneNumber};
use crate::domain::shared::value_objects::{MessageId, PhoneNumberId};
use crate::domain::transport::{
    CallHandle, CallRecord, ProviderTransport, SendMessageRequest, TransportError,
};
use crate::infrastructure::transport::dto::{CallRecordDto, MessageDto, PhoneNumberDto};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

#[derive(Deserialize)]
struct CallCreated {
    #[serde(alias = "call_sid", alias = "sid")]
    id: String,
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.message)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("error").to_string());
        warn!("Backend returned {}: {}", status, message);
        Err(TransportError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransportError> {
        Ok(self.execute(request).await?.json::<T>().await?)
    }
}

/// Convert a list of wire records, skipping the ones that do not parse
fn convert_all<D, T>(records: Vec<D>, kind: &str) -> Vec<T>
where
    T: TryFrom<D, Error = String>,
{
    records
        .into_iter()
        .filter_map(|dto| match T::try_from(dto) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed {}: {}", kind, e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl ProviderTransport for HttpTransport {
    async fn list_messages(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, TransportError> {
        let mut request = self.client.get(self.url("messages"));
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }
        let dtos: Vec<MessageDto> = self.fetch(request).await?;
        debug!("Fetched {} messages", dtos.len());
        Ok(convert_all(dtos, "message"))
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<Message, TransportError> {
        let dto: MessageDto = self
            .fetch(self.client.post(self.url("messages")).json(&request))
            .await?;
        Message::try_from(dto).map_err(TransportError::Decode)
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), TransportError> {
        self.execute(self.client.delete(self.url(&format!("messages/{}", id))))
            .await?;
        Ok(())
    }

    async fn delete_conversation(&self, counterpart: &str) -> Result<(), TransportError> {
        self.execute(
            self.client
                .delete(self.url("conversations"))
                .query(&[("counterpart", counterpart)]),
        )
        .await?;
        Ok(())
    }

    async fn mark_read(&self, counterpart: &str) -> Result<(), TransportError> {
        self.execute(
            self.client
                .post(self.url("conversations/read"))
                .json(&serde_json::json!({ "counterpart": counterpart })),
        )
        .await?;
        Ok(())
    }

    async fn list_calls(&self) -> Result<Vec<CallRecord>, TransportError> {
        let dtos: Vec<CallRecordDto> = self.fetch(self.client.get(self.url("calls"))).await?;
        Ok(convert_all(dtos, "call record"))
    }

    async fn initiate_call(&self, from: &str, to: &str) -> Result<CallHandle, TransportError> {
        let created: CallCreated = self
            .fetch(
                self.client
                    .post(self.url("calls"))
                    .json(&serde_json::json!({ "from": from, "to": to })),
            )
            .await?;
        Ok(CallHandle {
            provider_sid: created.id,
        })
    }

    async fn end_call(&self, provider_sid: &str) -> Result<(), TransportError> {
        self.execute(
            self.client
                .post(self.url(&format!("calls/{}/hangup", provider_sid))),
        )
        .await?;
        Ok(())
    }

    async fn list_phone_numbers(&self) -> Result<Vec<PhoneNumber>, TransportError> {
        let dtos: Vec<PhoneNumberDto> = self
            .fetch(self.client.get(self.url("phone-numbers")))
            .await?;
        Ok(convert_all(dtos, "phone number"))
    }

    async fn update_phone_number(
        &self,
        id: &PhoneNumberId,
        flags: NumberFlags,
    ) -> Result<PhoneNumber, TransportError> {
        let dto: PhoneNumberDto = self
            .fetch(
                self.client
                    .patch(self.url(&format!("phone-numbers/{}", id)))
                    .json(&flags),
            )
            .await?;
        PhoneNumber::try_from(dto).map_err(TransportError::Decode)
    }
}
