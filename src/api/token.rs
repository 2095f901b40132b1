//! Room access token issuance
//!
//! Tokens are HS256 JWTs carrying a video grant for a single room, signed
//! with the media server's API secret.

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{ApiState, ErrorResponse, error_response};
use crate::config::LiveKitConfig;
use crate::{Error, Result};

/// How long an issued token stays valid
pub const TOKEN_TTL_HOURS: i64 = 6;

/// Room permissions granted by a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    pub room_join: bool,
    pub room: String,
    pub can_publish: bool,
    pub can_subscribe: bool,
}

/// Signed token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub sub: String,
    pub name: String,
    pub nbf: i64,
    pub exp: i64,
    pub video: VideoGrant,
}

/// Sign an access token letting `identity` join `room`
///
/// # Errors
///
/// Returns `Error::Auth` if the API key or secret is not configured, or a
/// JWT error if signing fails
pub fn issue_token(livekit: &LiveKitConfig, room: &str, identity: &str) -> Result<String> {
    let (Some(api_key), Some(secret)) = (&livekit.api_key, &livekit.api_secret) else {
        return Err(Error::Auth("LiveKit API key and secret are not configured".to_string()));
    };

    let now = Utc::now();
    let claims = AccessClaims {
        iss: api_key.clone(),
        sub: identity.to_string(),
        name: identity.to_string(),
        nbf: now.timestamp(),
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        video: VideoGrant {
            room_join: true,
            room: room.to_string(),
            can_publish: true,
            can_subscribe: true,
        },
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )?;

    tracing::debug!(room, identity, "issued access token");
    Ok(token)
}

/// Token request body
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub room_name: String,
    pub participant_name: String,
}

/// Token response body
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Build token router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/token", post(create_token)).with_state(state)
}

async fn create_token(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<TokenRequest>,
) -> std::result::Result<Json<TokenResponse>, (StatusCode, Json<ErrorResponse>)> {
    if request.room_name.trim().is_empty() || request.participant_name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            error_response("invalid_request", "room_name and participant_name are required"),
        ));
    }

    issue_token(&state.livekit, &request.room_name, &request.participant_name)
        .map(|token| Json(TokenResponse { token }))
        .map_err(|e| {
            tracing::error!(error = %e, room = %request.room_name, "token issuance failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error_response("token_error", &e.to_string()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};
    use secrecy::SecretString;

    fn livekit() -> LiveKitConfig {
        LiveKitConfig {
            url: Some("ws://localhost:7880".to_string()),
            api_key: Some("devkey".to_string()),
            api_secret: Some(SecretString::from("devsecret".to_string())),
        }
    }

    #[test]
    fn token_carries_room_grant() {
        let token = issue_token(&livekit(), "ada", "alice").unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&["devkey"]);
        let data = decode::<AccessClaims>(&token, &DecodingKey::from_secret(b"devsecret"), &validation).unwrap();

        assert_eq!(data.claims.sub, "alice");
        assert_eq!(data.claims.name, "alice");
        assert_eq!(data.claims.exp - data.claims.nbf, TOKEN_TTL_HOURS * 3600);
        assert_eq!(
            data.claims.video,
            VideoGrant {
                room_join: true,
                room: "ada".to_string(),
                can_publish: true,
                can_subscribe: true,
            }
        );
    }

    #[test]
    fn missing_credentials_is_auth_error() {
        let config = LiveKitConfig {
            api_secret: None,
            ..livekit()
        };
        assert!(matches!(issue_token(&config, "ada", "alice"), Err(Error::Auth(_))));
    }

    #[test]
    fn grant_serializes_camel_case() {
        let grant = serde_json::to_value(VideoGrant {
            room_join: true,
            room: "ada".to_string(),
            can_publish: false,
            can_subscribe: true,
        })
        .unwrap();
        assert_eq!(grant["roomJoin"], true);
        assert_eq!(grant["canPublish"], false);
    }
}
