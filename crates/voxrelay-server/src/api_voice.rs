//! HTTP negotiation endpoints for voice sessions.

use crate::api::ApiError;
use crate::orchestrator::OrchestratorError;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use voxrelay_sfu::{Participant, Room};
use voxrelay_types::api::{
    AnswerRequest, IceCandidateRequest, OfferRequest, OfferResponse, StartSessionRequest,
    StartSessionResponse, StatusResponse, TranscriptionResponse,
};

/// Header carrying the caller's session id on STT uploads.
pub const SESSION_ID_HEADER: &str = "x-session-id";
/// Header carrying the room id on STT uploads.
pub const ROOM_ID_HEADER: &str = "x-room-id";

/// Resolves a room and one of its participants, touching the room.
fn lookup(
    state: &AppState,
    room_id: &str,
    session_id: &str,
) -> Result<(Arc<Room>, Arc<Participant>), ApiError> {
    let room = state
        .registry
        .get_room(room_id)
        .ok_or_else(|| ApiError::NotFound("room not found".to_string()))?;
    let participant = room
        .participant(session_id)
        .ok_or_else(|| ApiError::NotFound("participant not found".to_string()))?;
    room.touch();
    Ok((room, participant))
}

/// `POST /api/voice/start`
pub async fn start_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<StartSessionRequest>, JsonRejection>,
) -> Result<Json<StartSessionResponse>, ApiError> {
    let Json(request) = payload?;

    let started = state
        .orchestrator
        .start_session(&request.phone_number)
        .await
        .map_err(|e| match e {
            OrchestratorError::MissingPhoneNumber => ApiError::BadRequest(e.to_string()),
            OrchestratorError::Setup(_) => ApiError::InternalServerError(e.to_string()),
        })?;

    Ok(Json(StartSessionResponse {
        token: started.session_id.clone(),
        session_id: started.session_id,
        room_id: started.room_id,
    }))
}

/// `POST /api/voice/offer` — answers the caller's offer.
pub async fn offer_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<OfferRequest>, JsonRejection>,
) -> Result<Json<OfferResponse>, ApiError> {
    let Json(request) = payload?;
    let (room, participant) = lookup(&state, &request.room_id, &request.session_id)?;

    let answer = state
        .relay
        .create_answer(participant.session().as_ref(), request.offer)
        .await
        .map_err(|e| {
            tracing::warn!(room_id = %room.id(), session_id = %request.session_id, "offer failed: {}", e);
            ApiError::from(e)
        })?;

    tracing::info!(room_id = %room.id(), session_id = %request.session_id, "answered offer");
    Ok(Json(OfferResponse { answer }))
}

/// `POST /api/voice/answer` — applies the caller's answer to a server offer.
pub async fn answer_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(request) = payload?;
    let (_room, participant) = lookup(&state, &request.room_id, &request.session_id)?;

    state
        .relay
        .apply_answer(participant.session().as_ref(), request.answer)
        .await?;
    Ok(Json(StatusResponse::ok()))
}

/// `POST /api/voice/ice-candidate`
pub async fn ice_candidate_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<IceCandidateRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(request) = payload?;
    let (_room, participant) = lookup(&state, &request.room_id, &request.session_id)?;

    state
        .relay
        .add_ice_candidate(participant.session().as_ref(), request.candidate)
        .await?;
    tracing::debug!(session_id = %request.session_id, "ICE candidate added");
    Ok(Json(StatusResponse::ok()))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `POST /api/voice/stt` — buffers a chunk of caller audio and transcribes
/// once enough has accumulated.
///
/// Returns `204 No Content` while the session's buffer is below the flush
/// threshold.
pub async fn stt_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let session_id = header_value(&headers, SESSION_ID_HEADER)
        .ok_or_else(|| ApiError::BadRequest("X-Session-ID header is required".to_string()))?
        .to_string();
    let room_id = header_value(&headers, ROOM_ID_HEADER).unwrap_or("").to_string();

    if body.is_empty() {
        return Err(ApiError::BadRequest("no audio data".to_string()));
    }
    if !state.stt_service.is_configured() {
        tracing::warn!(session_id = %session_id, bytes = body.len(), "STT not configured");
        return Err(ApiError::InternalServerError(
            "STT not configured: missing OPENAI_API_KEY".to_string(),
        ));
    }

    if let Some(room) = state.registry.get_room(&room_id) {
        room.touch();
    }

    let Some(batch) = state.stt_buffers.append(&session_id, &body).await else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    tracing::debug!(room_id = %room_id, session_id = %session_id, bytes = batch.len(), "transcribing batch");
    let text = state
        .stt_service
        .transcribe(&batch, &state.language)
        .await
        .map_err(|e| {
            tracing::warn!(session_id = %session_id, "STT failed: {}", e);
            ApiError::InternalServerError("STT failed".to_string())
        })?;

    tracing::info!(room_id = %room_id, session_id = %session_id, text = %text, "transcribed caller audio");
    Ok(Json(TranscriptionResponse { text }).into_response())
}
