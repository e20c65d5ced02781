#![forbid(unsafe_code)]

use matchday_domain::{ChatMessage, MatchDetail, MatchId, MatchStatus, UserId};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// REST mutation failures. The only error kind surfaced to the user;
/// the cache stays untouched until the corresponding push event arrives.
#[derive(Debug, Error)]
pub enum RequestError {
	#[error("http: {0}")]
	Http(#[from] reqwest::Error),
	#[error("server returned status {code}")]
	Status { code: u16 },
	#[error("decode: {0}")]
	Decode(String),
}

/// A freshly issued private invite link.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteLink {
	pub url: String,
	pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Thin client for the mutation endpoints.
///
/// Successful mutations do not touch the cached entity; the push event is
/// the source of truth. Only fetches return data, and their responses go
/// through the controller's stale-response guard.
#[derive(Debug, Clone)]
pub struct ApiClient {
	http: reqwest::Client,
	base: reqwest::Url,
	auth_token: Option<String>,
}

impl ApiClient {
	pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, RequestError> {
		let base = reqwest::Url::parse(base_url).map_err(|e| RequestError::Decode(format!("base url: {e}")))?;
		Ok(Self {
			http: reqwest::Client::new(),
			base,
			auth_token,
		})
	}

	fn url(&self, path: &str) -> Result<reqwest::Url, RequestError> {
		self.base
			.join(path)
			.map_err(|e| RequestError::Decode(format!("url {path}: {e}")))
	}

	fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		match &self.auth_token {
			Some(token) => req.bearer_auth(token),
			None => req,
		}
	}

	async fn execute(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, RequestError> {
		let res = self.authorized(req).send().await?;
		if !res.status().is_success() {
			return Err(RequestError::Status {
				code: res.status().as_u16(),
			});
		}
		Ok(res)
	}

	async fn post_empty(&self, path: &str, body: &serde_json::Value) -> Result<(), RequestError> {
		let req = self.http.post(self.url(path)?).json(body);
		self.execute(req).await.map(|_| ())
	}

	async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
		let res = self.execute(self.http.get(self.url(path)?)).await?;
		res.json::<T>().await.map_err(|e| RequestError::Decode(e.to_string()))
	}

	pub async fn fetch_match(&self, match_id: &MatchId) -> Result<MatchDetail, RequestError> {
		self.get_json(&format!("matches/{match_id}")).await
	}

	pub async fn fetch_messages(&self, match_id: &MatchId) -> Result<Vec<ChatMessage>, RequestError> {
		self.get_json(&format!("matches/{match_id}/messages")).await
	}

	pub async fn request_join(&self, match_id: &MatchId) -> Result<(), RequestError> {
		self.post_empty(&format!("matches/{match_id}/requests"), &serde_json::json!({})).await
	}

	pub async fn accept(&self, match_id: &MatchId, user: &UserId) -> Result<(), RequestError> {
		self.post_empty(
			&format!("matches/{match_id}/requests/accept"),
			&serde_json::json!({ "userId": user }),
		)
		.await
	}

	pub async fn reject(&self, match_id: &MatchId, user: &UserId) -> Result<(), RequestError> {
		self.post_empty(
			&format!("matches/{match_id}/requests/reject"),
			&serde_json::json!({ "userId": user }),
		)
		.await
	}

	pub async fn promote(&self, match_id: &MatchId, user: &UserId) -> Result<(), RequestError> {
		self.post_empty(
			&format!("matches/{match_id}/admins"),
			&serde_json::json!({ "userId": user }),
		)
		.await
	}

	pub async fn demote(&self, match_id: &MatchId, user: &UserId) -> Result<(), RequestError> {
		self.post_empty(
			&format!("matches/{match_id}/admins/remove"),
			&serde_json::json!({ "userId": user }),
		)
		.await
	}

	pub async fn expel(&self, match_id: &MatchId, user: &UserId) -> Result<(), RequestError> {
		self.post_empty(
			&format!("matches/{match_id}/expel"),
			&serde_json::json!({ "userId": user }),
		)
		.await
	}

	pub async fn leave(&self, match_id: &MatchId) -> Result<(), RequestError> {
		self.post_empty(&format!("matches/{match_id}/leave"), &serde_json::json!({})).await
	}

	pub async fn delete_match(&self, match_id: &MatchId) -> Result<(), RequestError> {
		let req = self.http.delete(self.url(&format!("matches/{match_id}"))?);
		self.execute(req).await.map(|_| ())
	}

	pub async fn set_status(&self, match_id: &MatchId, status: MatchStatus) -> Result<(), RequestError> {
		self.post_empty(
			&format!("matches/{match_id}/status"),
			&serde_json::json!({ "status": status }),
		)
		.await
	}

	pub async fn toggle_rivalry(&self, match_id: &MatchId, agreed: bool) -> Result<(), RequestError> {
		self.post_empty(
			&format!("matches/{match_id}/rivalry"),
			&serde_json::json!({ "agreed": agreed }),
		)
		.await
	}

	pub async fn issue_invite_link(&self, match_id: &MatchId) -> Result<InviteLink, RequestError> {
		let req = self.http.post(self.url(&format!("matches/{match_id}/invite-link"))?);
		let res = self.execute(req).await?;
		res.json::<InviteLink>().await.map_err(|e| RequestError::Decode(e.to_string()))
	}

	pub async fn send_message(&self, match_id: &MatchId, text: &str) -> Result<(), RequestError> {
		self.post_empty(
			&format!("matches/{match_id}/messages"),
			&serde_json::json!({ "text": text }),
		)
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_invalid_base_url() {
		assert!(matches!(ApiClient::new("not a url", None), Err(RequestError::Decode(_))));
	}

	#[test]
	fn accepts_base_url_with_token() {
		let client = ApiClient::new("http://localhost:9088/api/", Some("tok".to_string()));
		assert!(client.is_ok());
	}
}
