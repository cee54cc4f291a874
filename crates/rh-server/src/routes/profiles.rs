//! Transcoding profile route handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rh_core::{Error, ProfileId, TranscodingProfile};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;

/// Profile as exposed over the API.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProfileBody {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub video_codec: String,
    pub audio_codec: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub max_bitrate: Option<u64>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub audio_codecs: Vec<String>,
    #[serde(default)]
    pub max_audio_channels: Option<u32>,
    #[serde(default)]
    pub downmix_layout: Option<String>,
    #[serde(default)]
    pub loudness_filter: Option<String>,
    #[serde(default)]
    pub preferred_languages: Vec<String>,
}

impl ProfileBody {
    fn from_model(p: &TranscodingProfile) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.clone(),
            video_codec: p.video_codec.clone(),
            audio_codec: p.audio_codec.clone(),
            resolution: p.resolution.clone(),
            max_bitrate: p.max_bitrate,
            container: Some(p.container.clone()),
            audio_codecs: p.audio_codecs.clone(),
            max_audio_channels: p.max_audio_channels,
            downmix_layout: p.downmix_layout.clone(),
            loudness_filter: p.loudness_filter.clone(),
            preferred_languages: p.preferred_languages.clone(),
        }
    }

    fn into_model(self) -> Result<TranscodingProfile, Error> {
        let id = self.id.trim();
        if id.is_empty() || id.contains(['/', '\\']) {
            return Err(Error::Validation("profile id must be a non-empty name".into()));
        }
        if self.video_codec.trim().is_empty() || self.audio_codec.trim().is_empty() {
            return Err(Error::Validation("video_codec and audio_codec are required".into()));
        }
        let profile = TranscodingProfile {
            id: ProfileId::new(id),
            name: self.name,
            video_codec: self.video_codec,
            audio_codec: self.audio_codec,
            resolution: self.resolution,
            max_bitrate: self.max_bitrate,
            container: self.container.unwrap_or_else(|| "mp4".into()),
            audio_codecs: self.audio_codecs,
            max_audio_channels: self.max_audio_channels,
            downmix_layout: self.downmix_layout,
            loudness_filter: self.loudness_filter,
            preferred_languages: self.preferred_languages,
        };
        if profile.resolution.is_some() && profile.resolution_dims().is_none() {
            return Err(Error::Validation("resolution must look like 1280x720".into()));
        }
        Ok(profile)
    }
}

/// GET /api/profiles
#[utoipa::path(
    get,
    path = "/api/profiles",
    responses((status = 200, description = "Configured and stored profiles", body = Vec<ProfileBody>))
)]
pub async fn list_profiles(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<ProfileBody>>, AppError> {
    let profiles = ctx.profiles()?;
    Ok(Json(profiles.iter().map(ProfileBody::from_model).collect()))
}

/// POST /api/profiles
///
/// Profiles are immutable once created; reusing an ID is a conflict.
#[utoipa::path(
    post,
    path = "/api/profiles",
    request_body = ProfileBody,
    responses(
        (status = 201, description = "Profile created", body = ProfileBody),
        (status = 400, description = "Invalid profile"),
        (status = 403, description = "No writable store"),
        (status = 409, description = "Profile ID already exists")
    )
)]
pub async fn create_profile(
    State(ctx): State<AppContext>,
    Json(body): Json<ProfileBody>,
) -> Result<(StatusCode, Json<ProfileBody>), AppError> {
    let profile = body.into_model()?;
    let store = ctx.store()?;
    if ctx.profile(Some(profile.id.as_str())).is_ok() {
        return Err(Error::Conflict(format!("profile {} already exists", profile.id)).into());
    }
    store.put_profile(&profile)?;
    tracing::info!(profile_id = %profile.id, "Profile created");
    Ok((StatusCode::CREATED, Json(ProfileBody::from_model(&profile))))
}
