//! HTTP surface: `/api/state`, `/api/track`, `/api/passes` and `/health`.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use skywatch_common::api::{
    ErrorBody, ObjectError, PassView, PassesResponse, SatelliteState, SatelliteTrack, StateResponse,
    TrackResponse,
};
use skywatch_common::{ElementSet, Observer, Pass};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::config::{LimitsConfig, SatelliteConfig};
use crate::error::NoCachedData;
use crate::model::elements::ElementCache;
use crate::model::orbit::{OrbitProvider, PropagationError};
use crate::module::passes::predict_passes;
use crate::module::result_cache::{ResultCache, fingerprint};
use crate::module::track::{TrackError, sample_track};

const KM_S_TO_MPH: f64 = 2236.936_292;
const DEFAULT_TZ_OFFSET: &str = "-06:00";
const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidParameter(String),

    #[error(transparent)]
    NoData(#[from] NoCachedData),

    #[error("orbit propagation failed: {0}")]
    Propagation(#[from] PropagationError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::NoData(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Propagation(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// Shared request-handling state.
pub struct AppState {
    pub cache: Arc<ElementCache>,
    pub provider: Arc<dyn OrbitProvider>,
    pub results: ResultCache,
    pub satellites: Vec<SatelliteConfig>,
    pub limits: LimitsConfig,
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/state", get(get_state))
        .route("/api/track", get(get_track))
        .route("/api/passes", get(get_passes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ============ Query parsing ============

type Params = HashMap<String, String>;

/// Numeric parameter; absent or empty values are `None`, unparsable ones
/// are rejected.
fn number_param(params: &Params, name: &str) -> Result<Option<f64>, ApiError> {
    match params.get(name).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<f64>()
            .map(|v| if v.is_nan() { None } else { Some(v) })
            .map_err(|_| ApiError::InvalidParameter(format!("invalid number for '{}': {}", name, raw))),
    }
}

fn int_param(params: &Params, name: &str) -> Result<Option<i64>, ApiError> {
    Ok(number_param(params, name)?.map(|v| v as i64))
}

fn coordinate_param(params: &Params, name: &str, limit: f64) -> Result<f64, ApiError> {
    let value = number_param(params, name)?
        .ok_or_else(|| ApiError::InvalidParameter(format!("'{}' is required", name)))?;
    if !value.is_finite() || value.abs() > limit {
        return Err(ApiError::InvalidParameter(format!(
            "'{}' must be between -{} and {}",
            name, limit, limit
        )));
    }
    Ok(value)
}

static TZ_OFFSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-]?)(\d{2}):(\d{2})$").expect("tz_offset pattern is valid"));

/// Parse `±HH:MM`. A leading `+` that arrived as a space (form encoding)
/// is accepted.
pub fn parse_tz_offset(raw: &str) -> Result<FixedOffset, ApiError> {
    let invalid = || ApiError::InvalidParameter(format!("tz_offset must look like -06:00, got '{}'", raw));

    let caps = TZ_OFFSET_RE.captures(raw.trim()).ok_or_else(invalid)?;

    let hours: i32 = caps[2].parse().map_err(|_| invalid())?;
    let minutes: i32 = caps[3].parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    let sign = if &caps[1] == "-" { -1 } else { 1 };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

fn format_offset(offset: &FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let seconds = seconds.abs();
    format!("{}{:02}:{:02}", sign, seconds / 3600, (seconds % 3600) / 60)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackQuery {
    pub minutes: i64,
    pub step_sec: i64,
}

impl TrackQuery {
    pub fn from_params(params: &Params, limits: &LimitsConfig) -> Result<Self, ApiError> {
        let step = match int_param(params, "step_sec")? {
            Some(step) => Some(step),
            None => int_param(params, "step_seconds")?,
        };

        Ok(Self {
            minutes: limits.minutes.clamp(int_param(params, "minutes")?),
            step_sec: limits.step_sec.clamp(step),
        })
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(
            "track",
            &[("minutes", self.minutes.to_string()), ("step_sec", self.step_sec.to_string())],
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassQuery {
    pub satellite: SatelliteConfig,
    pub observer: Observer,
    pub hours: i64,
    pub limit: i64,
    pub min_el: f64,
    pub tz_offset: FixedOffset,
}

impl PassQuery {
    pub fn from_params(
        params: &Params,
        satellites: &[SatelliteConfig],
        limits: &LimitsConfig,
    ) -> Result<Self, ApiError> {
        let satellite = match params.get("sat").map(|s| s.trim()).filter(|s| !s.is_empty()) {
            Some(key) => satellites
                .iter()
                .find(|sat| sat.key == key)
                .ok_or_else(|| ApiError::InvalidParameter(format!("unknown satellite '{}'", key)))?,
            None => satellites
                .first()
                .ok_or_else(|| ApiError::Internal("no satellites configured".to_string()))?,
        };

        let latitude = coordinate_param(params, "lat", 90.0)?;
        let longitude = coordinate_param(params, "lon", 180.0)?;
        let elevation = limits.elev.clamp(number_param(params, "elev")?);
        let tz_raw = params.get("tz_offset").map(String::as_str).unwrap_or(DEFAULT_TZ_OFFSET);

        Ok(Self {
            satellite: satellite.clone(),
            observer: Observer::new(latitude, longitude, elevation),
            hours: limits.hours.clamp(int_param(params, "hours")?),
            limit: limits.limit.clamp(int_param(params, "limit")?),
            min_el: limits.min_el.clamp(number_param(params, "min_el")?),
            tz_offset: parse_tz_offset(tz_raw)?,
        })
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(
            "passes",
            &[
                ("sat", self.satellite.key.clone()),
                ("lat", format!("{:.6}", self.observer.latitude_deg)),
                ("lon", format!("{:.6}", self.observer.longitude_deg)),
                ("elev", format!("{:.1}", self.observer.elevation_m)),
                ("hours", self.hours.to_string()),
                ("limit", self.limit.to_string()),
                ("min_el", format!("{:.1}", self.min_el)),
                ("tz", format_offset(&self.tz_offset)),
            ],
        )
    }
}

// ============ Handlers ============

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<(StatusCode, String), ApiError> {
    let body = serde_json::to_string(body).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((status, body))
}

fn raw_json(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn object_error(sat: &SatelliteConfig, error: impl ToString) -> ObjectError {
    ObjectError {
        key: sat.key.clone(),
        norad_id: sat.norad_id,
        error: error.to_string(),
    }
}

/// 503 only when every object failed.
fn partial_status(succeeded: usize, failed: usize) -> StatusCode {
    if succeeded == 0 && failed > 0 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// Resolve element sets for every configured object concurrently.
async fn resolve_all(state: &AppState) -> Vec<(&SatelliteConfig, Result<ElementSet, NoCachedData>)> {
    let lookups = state
        .satellites
        .iter()
        .map(|sat| async move { (sat, state.cache.get(sat.norad_id).await) });
    join_all(lookups).await
}

async fn get_state(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let now = Utc::now();
    let mut satellites = Vec::new();
    let mut errors = Vec::new();

    for (sat, resolved) in resolve_all(&state).await {
        let result = resolved
            .map_err(ApiError::from)
            .and_then(|set| Ok((state.provider.position_at(&set, now)?, set)));

        match result {
            Ok((position, set)) => {
                let speed = position.speed_km_s();
                satellites.push(SatelliteState {
                    key: sat.key.clone(),
                    label: sat.label.clone(),
                    norad_id: sat.norad_id,
                    name: set.name.clone(),
                    lat: position.latitude_deg,
                    lon: position.longitude_deg,
                    alt_km: position.altitude_km,
                    speed_km_s: speed,
                    speed_mph: speed * KM_S_TO_MPH,
                    tle_age: set.age(now).num_seconds(),
                    tle_fetched_utc: set.fetched_at,
                    tle_source: set.source,
                });
            }
            Err(e) => errors.push(object_error(sat, e)),
        }
    }

    let status = partial_status(satellites.len(), errors.len());
    let body = StateResponse {
        utc: now,
        satellites,
        errors,
    };
    Ok((status, Json(body)).into_response())
}

async fn get_track(
    State(state): State<SharedState>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    let query = TrackQuery::from_params(&params, &state.limits)?;
    let key = query.fingerprint();

    if let Some(body) = state.results.get(&key).await {
        debug!("Result cache hit: {}", key);
        return Ok(raw_json(StatusCode::OK, body));
    }

    let now = Utc::now();
    let duration = Duration::minutes(query.minutes);
    let step = Duration::seconds(query.step_sec);
    let mut satellites = Vec::new();
    let mut errors = Vec::new();

    for (sat, resolved) in resolve_all(&state).await {
        let points = match resolved {
            Ok(set) => sample_track(state.provider.as_ref(), &set, now, duration, step),
            Err(e) => {
                errors.push(object_error(sat, e));
                continue;
            }
        };

        match points {
            Ok(points) => satellites.push(SatelliteTrack {
                key: sat.key.clone(),
                label: sat.label.clone(),
                norad_id: sat.norad_id,
                points,
            }),
            Err(e @ TrackError::Propagation(_)) => errors.push(object_error(sat, e)),
            Err(e) => return Err(ApiError::InvalidParameter(e.to_string())),
        }
    }

    let status = partial_status(satellites.len(), errors.len());
    let cacheable = errors.is_empty();
    let response = TrackResponse {
        utc: now,
        minutes: query.minutes,
        step_sec: query.step_sec,
        satellites,
        errors,
    };

    let (status, body) = json_response(status, &response)?;
    if cacheable {
        state.results.put(key, body.clone()).await;
    }
    Ok(raw_json(status, body))
}

fn pass_view(pass: &Pass, offset: &FixedOffset) -> PassView {
    let local = |t: DateTime<Utc>| t.with_timezone(offset).format(LOCAL_TIME_FORMAT).to_string();

    PassView {
        rise_utc: pass.rise_time,
        max_utc: pass.max_time,
        set_utc: pass.set_time,
        rise_local: local(pass.rise_time),
        max_local: local(pass.max_time),
        set_local: local(pass.set_time),
        duration_s: pass.duration_seconds,
        max_el_deg: pass.max_elevation_deg,
        max_az_deg: pass.max_azimuth_deg,
        sun_alt_deg: pass.observer_sun_altitude_deg,
        iss_sunlit: pass.object_sunlit,
        visible: pass.visible,
        visibility_label: pass.visibility_label.clone(),
    }
}

async fn get_passes(
    State(state): State<SharedState>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    let query = PassQuery::from_params(&params, &state.satellites, &state.limits)?;
    let key = query.fingerprint();

    if let Some(body) = state.results.get(&key).await {
        debug!("Result cache hit: {}", key);
        return Ok(raw_json(StatusCode::OK, body));
    }

    let elements = state.cache.get(query.satellite.norad_id).await?;
    let now = Utc::now();

    // Event search propagates thousands of times; keep it off the reactor
    let provider = state.provider.clone();
    let search = query.clone();
    let passes = tokio::task::spawn_blocking(move || {
        predict_passes(
            provider.as_ref(),
            &elements,
            &search.observer,
            now,
            Duration::hours(search.hours),
            search.min_el,
            search.limit as usize,
        )
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    let response = PassesResponse {
        key: query.satellite.key.clone(),
        label: query.satellite.label.clone(),
        norad_id: query.satellite.norad_id,
        utc: now,
        passes: passes.iter().map(|p| pass_view(p, &query.tz_offset)).collect(),
    };

    let (status, body) = json_response(StatusCode::OK, &response)?;
    state.results.put(key, body.clone()).await;
    Ok(raw_json(status, body))
}
