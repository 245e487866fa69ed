//! Dashboard API: API keys, profile, usage, scraping and the playground.
//!
//! Every call except the playground needs a bearer token, obtained from
//! the session manager right before sending. A `401` raises the session's
//! unauthorized signal (which refreshes the token in the background) and
//! is returned as an error; retrying is up to the caller.

use scrapedeck_protocol::{
    ApiKey, NewApiKey, PasswordChange, PlaygroundRequest, PlaygroundResponse, Profile,
    ProfileUpdate,
};
use scrapedeck_session::TokenStore;
use scrapedeck_transport::{Call, TransportError, error_message};
use serde::Serialize;
use serde_json::Value;

use crate::{ScrapedeckClient, ScrapedeckError};

impl<S: TokenStore> ScrapedeckClient<S> {
    // -- API keys -------------------------------------------------------------

    pub async fn api_keys(&self) -> Result<Vec<ApiKey>, ScrapedeckError> {
        let call = Call::get("/api_keys/get_keys").fallback("Failed to fetch API keys");
        self.send(call).await
    }

    pub async fn create_api_key(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ApiKey, ScrapedeckError> {
        let call = Call::post("/api_keys/create")
            .json(&NewApiKey {
                name: name.to_owned(),
                description: description.map(str::to_owned),
            })?
            .fallback("Failed to create API key");
        self.send(call).await
    }

    /// The backend answers `204 No Content`.
    pub async fn delete_api_key(&self, id: i64) -> Result<(), ScrapedeckError> {
        let call = Call::delete(format!("/api_keys/delete_key/{id}")).fallback("Failed to delete API key");
        let call = self.authorize(call).await?;
        Ok(self.api.send_empty(call).await?)
    }

    // -- Profile --------------------------------------------------------------

    pub async fn profile(&self) -> Result<Profile, ScrapedeckError> {
        let call = Call::get("/profile/get_profile").fallback("Failed to fetch profile");
        self.send(call).await
    }

    pub async fn update_profile(&self, name: &str) -> Result<Profile, ScrapedeckError> {
        let call = Call::patch("/profile/update_profile")
            .json(&ProfileUpdate {
                name: name.to_owned(),
            })?
            .fallback("Failed to update profile");
        self.send(call).await
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> Result<(), ScrapedeckError> {
        let call = Call::patch("/profile/reset_password")
            .json(&PasswordChange {
                current_password: current_password.to_owned(),
                new_password: new_password.to_owned(),
                new_password_confirm: new_password_confirm.to_owned(),
            })?
            .fallback("Failed to change password");
        let call = self.authorize(call).await?;
        Ok(self.api.send_empty(call).await?)
    }

    /// Deletes the account. `Ok(false)` if the backend refused.
    ///
    /// The session is left as is; call
    /// [`logout`](scrapedeck_session::SessionManager::logout) afterwards.
    pub async fn delete_profile(&self) -> Result<bool, ScrapedeckError> {
        let call = self.authorize(Call::delete("/profile/delete_profile")).await?;
        let (status, _) = self.api.exchange(&call).await?;
        Ok(status.is_success())
    }

    // -- Usage & scraping -----------------------------------------------------

    /// Usage statistics for the dashboard page, as the backend sends them.
    pub async fn dashboard(&self) -> Result<Value, ScrapedeckError> {
        let call = Call::get("/dashboard/").fallback("Failed to fetch dashboard data");
        self.send(call).await
    }

    /// Runs an authenticated scrape.
    pub async fn scrape<B: Serialize>(&self, request: &B) -> Result<Value, ScrapedeckError> {
        let call = Call::post("/scrape/").json(request)?.fallback("Scrape request failed");
        self.send(call).await
    }

    // -- Playground -----------------------------------------------------------

    /// A one-off scrape against the public playground. No session needed.
    ///
    /// # Errors
    /// [`ScrapedeckError::Playground`] with a message suited for display.
    pub async fn playground(&self, request: &PlaygroundRequest) -> Result<PlaygroundResponse, ScrapedeckError> {
        let call = Call::post("/scrape/playground").json(request)?;
        let (status, body) = self.playground.exchange(&call).await.map_err(|e| match e {
            TransportError::Request(_) => ScrapedeckError::Playground {
                status: 0,
                message: "Network error. Please check your connection and try again.".to_owned(),
            },
            other => other.into(),
        })?;

        if status.is_success() {
            return Ok(scrapedeck_protocol::decode(&body)?);
        }

        let status = status.as_u16();
        let message = playground_message(status, error_message(&body));
        tracing::debug!(status, %message, "playground request rejected");
        Err(ScrapedeckError::Playground { status, message })
    }

    // -- Plumbing -------------------------------------------------------------

    async fn authorize(&self, call: Call) -> Result<Call, ScrapedeckError> {
        let token = self
            .session
            .get_access_token()
            .await
            .ok_or(ScrapedeckError::NotAuthenticated)?;
        Ok(call.bearer(token))
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, call: Call) -> Result<T, ScrapedeckError> {
        let call = self.authorize(call).await?;
        Ok(self.api.send(call).await?)
    }
}

fn playground_message(status: u16, detail: Option<String>) -> String {
    match status {
        429 => "Rate limit exceeded. Please wait a minute before trying again.".to_owned(),
        400 => detail.unwrap_or_else(|| "Invalid request parameters".to_owned()),
        408 => "Request timed out. The website might be slow to respond.".to_owned(),
        503 => "Could not connect to the target website. Please check the URL.".to_owned(),
        _ => detail.unwrap_or_else(|| "An unexpected error occurred".to_owned()),
    }
}
