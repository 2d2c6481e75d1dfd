//! Recurring-scan schedule CRUD.
//!
//! `next_run` is (re)computed from the current instant whenever a
//! schedule is created or updated, so the scheduler never has to guess
//! after a definition change.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, ErrorResponse};
use crate::db::Store;
use crate::models::{Frequency, ScheduledScan};
use crate::scheduler::next_occurrence;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn db_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Database error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Database error", "DB_ERROR").with_details(e.to_string())),
    )
}

fn schedule_not_found(schedule_id: Uuid) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            format!("Schedule {} not found", schedule_id),
            "SCHEDULE_NOT_FOUND",
        )),
    )
}

fn bad_request(message: impl Into<String>, code: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message, code)),
    )
}

#[derive(Deserialize)]
pub struct CreateScheduleRequest {
    pub target_url: String,
    pub frequency: Frequency,
    #[serde(default = "default_time_of_day")]
    pub time_of_day: String,
    pub day_of_week: Option<u32>,
    pub day_of_month: Option<u32>,
    pub month: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_time_of_day() -> String {
    "02:00".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Partial update; omitted fields keep their stored value.
#[derive(Deserialize)]
pub struct UpdateScheduleRequest {
    pub target_url: Option<String>,
    pub frequency: Option<Frequency>,
    pub time_of_day: Option<String>,
    pub day_of_week: Option<u32>,
    pub day_of_month: Option<u32>,
    pub month: Option<u32>,
    pub enabled: Option<bool>,
}

fn validate_calendar_fields(
    day_of_week: Option<u32>,
    day_of_month: Option<u32>,
    month: Option<u32>,
) -> Result<(), ApiError> {
    if let Some(dow) = day_of_week {
        if dow > 6 {
            return Err(bad_request(
                "day_of_week must be 0 (Sunday) through 6 (Saturday)",
                "INVALID_DAY_OF_WEEK",
            ));
        }
    }
    if let Some(dom) = day_of_month {
        if !(1..=31).contains(&dom) {
            return Err(bad_request(
                "day_of_month must be between 1 and 31",
                "INVALID_DAY_OF_MONTH",
            ));
        }
    }
    if let Some(m) = month {
        if !(1..=12).contains(&m) {
            return Err(bad_request("month must be between 1 and 12", "INVALID_MONTH"));
        }
    }
    Ok(())
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduledScan>), ApiError> {
    validate_calendar_fields(req.day_of_week, req.day_of_month, req.month)?;

    let mut schedule = ScheduledScan {
        id: Uuid::new_v4(),
        target_url: req.target_url,
        frequency: req.frequency,
        time_of_day: req.time_of_day,
        day_of_week: req.day_of_week,
        day_of_month: req.day_of_month,
        month: req.month,
        enabled: req.enabled,
        last_run: None,
        next_run: None,
        created_at: Utc::now(),
    };
    schedule.next_run = Some(next_occurrence(&schedule, Utc::now()));

    state
        .store
        .create_schedule(&schedule)
        .await
        .map_err(db_error)?;

    tracing::info!(
        "Schedule {} created: {} {} at {}",
        schedule.id,
        schedule.frequency.as_str(),
        schedule.target_url,
        schedule.time_of_day
    );

    Ok((StatusCode::CREATED, Json(schedule)))
}

pub async fn list_schedules(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScheduledScan>>, ApiError> {
    let schedules = state.store.list_schedules().await.map_err(db_error)?;
    Ok(Json(schedules))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ScheduledScan>, ApiError> {
    let schedule = state
        .store
        .get_schedule(schedule_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| schedule_not_found(schedule_id))?;
    Ok(Json(schedule))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<Json<ScheduledScan>, ApiError> {
    validate_calendar_fields(req.day_of_week, req.day_of_month, req.month)?;

    let mut schedule = state
        .store
        .get_schedule(schedule_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| schedule_not_found(schedule_id))?;

    if let Some(target_url) = req.target_url {
        schedule.target_url = target_url;
    }
    if let Some(frequency) = req.frequency {
        schedule.frequency = frequency;
    }
    if let Some(time_of_day) = req.time_of_day {
        schedule.time_of_day = time_of_day;
    }
    if req.day_of_week.is_some() {
        schedule.day_of_week = req.day_of_week;
    }
    if req.day_of_month.is_some() {
        schedule.day_of_month = req.day_of_month;
    }
    if req.month.is_some() {
        schedule.month = req.month;
    }
    if let Some(enabled) = req.enabled {
        schedule.enabled = enabled;
    }

    // The definition changed; the old next_run may no longer be valid.
    schedule.next_run = Some(next_occurrence(&schedule, Utc::now()));

    state
        .store
        .update_schedule(&schedule)
        .await
        .map_err(db_error)?;

    Ok(Json(schedule))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .store
        .delete_schedule(schedule_id)
        .await
        .map_err(db_error)?;
    if !deleted {
        return Err(schedule_not_found(schedule_id));
    }
    tracing::info!("Schedule {} deleted", schedule_id);
    Ok(StatusCode::NO_CONTENT)
}
