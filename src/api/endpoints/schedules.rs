//! Schedule surface for the external collaborators that feed the engine:
//! fulfillment sync, manual entry, patient history, in-app confirmation,
//! and patient time edits.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository;
use crate::engine::inventory;
use crate::models::{ClockTime, DoseRecord, DoseSource, MedicationLine, TimeSlot};

/// Default slot times used when a fulfillment sync fans medicines out into
/// dose records.
fn default_slot_time(slot: TimeSlot) -> ClockTime {
    let display = match slot {
        TimeSlot::Morning => "08:00 AM",
        TimeSlot::Afternoon => "02:00 PM",
        TimeSlot::Night => "08:00 PM",
    };
    // Statically valid.
    ClockTime::parse_12h(display).unwrap_or_else(|_| unreachable!())
}

#[derive(Debug, Deserialize)]
pub struct DosageRoutine {
    pub time_slot: TimeSlot,
    pub qty: u32,
}

#[derive(Debug, Deserialize)]
pub struct FulfillmentMedicine {
    pub name: String,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub is_continuous: bool,
    pub dosage_routine: Vec<DosageRoutine>,
}

#[derive(Debug, Deserialize)]
pub struct FulfillmentSync {
    pub patient_phone: String,
    pub medicines: Vec<FulfillmentMedicine>,
    #[serde(default)]
    pub next_visit_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub message: String,
    pub dose_ids: Vec<Uuid>,
}

/// `POST /api/schedules/sync` — fan a fulfillment bill out into per-slot
/// dose records at the default slot times.
pub async fn sync_fulfillment(
    State(ctx): State<ApiContext>,
    Json(body): Json<FulfillmentSync>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let now = Local::now().naive_local();
    let mut dose_ids = Vec::new();

    for slot in [TimeSlot::Morning, TimeSlot::Afternoon, TimeSlot::Night] {
        let lines: Vec<MedicationLine> = body
            .medicines
            .iter()
            .flat_map(|med| {
                med.dosage_routine
                    .iter()
                    .filter(|d| d.time_slot == slot)
                    .map(|d| MedicationLine {
                        name: med.name.clone(),
                        qty: d.qty,
                        stock: med.stock,
                        is_continuous: med.is_continuous,
                        low_stock_notified: false,
                    })
            })
            .collect();
        if lines.is_empty() {
            continue;
        }

        let mut dose = DoseRecord::new(
            body.patient_phone.clone(),
            DoseSource::Fulfillment,
            slot,
            default_slot_time(slot),
            lines,
            now,
        );
        dose.next_visit_date = body.next_visit_date;
        repository::insert_dose(&conn, &dose)?;
        dose_ids.push(dose.id);
    }

    info!(
        patient = %body.patient_phone,
        created = dose_ids.len(),
        "fulfillment sync created dose records"
    );
    Ok(Json(CreatedResponse {
        message: "Prescription synced to patient schedule".into(),
        dose_ids,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ManualMedication {
    pub name: String,
    pub qty: u32,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub is_continuous: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateDose {
    pub patient_phone: String,
    pub time_slot: TimeSlot,
    /// 12-hour display form (`"08:00 AM"`) or 24-hour (`"08:00"`).
    pub target_time: String,
    pub medications: Vec<ManualMedication>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub next_visit_date: Option<NaiveDate>,
}

/// `POST /api/schedules` — manual entry of one dose record.
pub async fn create(
    State(ctx): State<ApiContext>,
    Json(body): Json<CreateDose>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let target_time = ClockTime::parse_12h(&body.target_time)
        .or_else(|_| ClockTime::parse_24h(&body.target_time))
        .map_err(ApiError::from)?;
    if body.medications.is_empty() {
        return Err(ApiError::BadRequest("medications must not be empty".into()));
    }

    let conn = ctx.core.open_db()?;
    let now = Local::now().naive_local();
    let lines = body
        .medications
        .iter()
        .map(|m| MedicationLine {
            name: m.name.clone(),
            qty: m.qty,
            stock: m.stock,
            is_continuous: m.is_continuous,
            low_stock_notified: false,
        })
        .collect();

    let mut dose = DoseRecord::new(
        body.patient_phone,
        DoseSource::Manual,
        body.time_slot,
        target_time,
        lines,
        now,
    );
    dose.photo = body.photo;
    dose.next_visit_date = body.next_visit_date;
    repository::insert_dose(&conn, &dose)?;

    info!(dose_id = %dose.id, patient = %dose.patient_phone, "manual dose record created");
    Ok(Json(CreatedResponse {
        message: "Reminder created".into(),
        dose_ids: vec![dose.id],
    }))
}

/// `GET /api/patients/:phone/schedules` — full history, terminal records
/// included.
pub async fn list_for_patient(
    State(ctx): State<ApiContext>,
    Path(phone): Path<String>,
) -> Result<Json<Vec<DoseRecord>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(repository::list_by_patient(&conn, &phone)?))
}

#[derive(Debug, Serialize)]
pub struct TakeResponse {
    pub message: String,
}

/// `POST /api/schedules/:id/take` — in-app confirmation. Same transition
/// and inventory post-processing as the voice webhook.
pub async fn take(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<TakeResponse>, ApiError> {
    let mut conn = ctx.core.open_db()?;
    let dose = repository::get_dose(&conn, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("dose {id} not found")))?;
    let patient = repository::get_patient(&conn, &dose.patient_phone)?
        .ok_or_else(|| ApiError::NotFound(format!("patient {} not found", dose.patient_phone)))?;

    if !repository::confirm_taken(&conn, &id)? {
        return Err(ApiError::Conflict("dose is not pending".into()));
    }
    info!(dose_id = %id, "dose confirmed taken via app");
    inventory::process_taken(
        &mut conn,
        ctx.core.gateway(),
        &dose,
        &patient,
        &ctx.core.config.country_prefix,
    )
    .await?;

    Ok(Json(TakeResponse {
        message: "Medicine marked as taken".into(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTime {
    /// 24-hour input from the app's time picker.
    pub new_time: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateTimeResponse {
    pub message: String,
    pub target_time: String,
}

/// `POST /api/schedules/:id/time` — patient time edit. Stores the new
/// display form, resets the alert level, and restarts the first-call
/// window.
pub async fn update_time(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTime>,
) -> Result<Json<UpdateTimeResponse>, ApiError> {
    let target_time = ClockTime::parse_24h(&body.new_time).map_err(ApiError::from)?;
    let conn = ctx.core.open_db()?;
    let now = Local::now().naive_local();

    if !repository::update_target_time(&conn, &id, target_time, target_time.next_occurrence(now))? {
        return Err(ApiError::NotFound(format!("pending dose {id} not found")));
    }
    info!(dose_id = %id, target_time = %target_time, "target time updated, escalation reset");

    Ok(Json(UpdateTimeResponse {
        message: "Time updated".into(),
        target_time: target_time.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::engine_router;
    use crate::config::EngineConfig;
    use crate::core_state::CoreState;
    use crate::gateway::mock::RecordingGateway;
    use crate::models::{DoseStatus, Language, Patient, ReminderChannel};

    fn test_state() -> (Arc<CoreState>, Arc<RecordingGateway>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::for_tests(dir.path().join("engine.db"));
        let gateway = Arc::new(RecordingGateway::new());
        let state = Arc::new(CoreState::new(config, gateway.clone()));
        let conn = state.open_db().unwrap();
        repository::upsert_patient(
            &conn,
            &Patient {
                phone: "9000000001".into(),
                name: "Asha".into(),
                language: Some(Language::English),
                reminder_channel: ReminderChannel::Call,
                caretaker_phone: None,
            },
        )
        .unwrap();
        (state, gateway, dir)
    }

    async fn request_json(
        app: &axum::Router,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        let request = match body {
            Some(v) => builder.body(Body::from(v.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn fulfillment_sync_fans_out_per_slot() {
        let (state, _gateway, _dir) = test_state();
        let app = engine_router(state.clone());

        let (status, body) = request_json(
            &app,
            "POST",
            "/api/schedules/sync",
            Some(json!({
                "patient_phone": "9000000001",
                "medicines": [
                    {
                        "name": "Metformin",
                        "stock": 30,
                        "is_continuous": true,
                        "dosage_routine": [
                            {"time_slot": "Morning", "qty": 1},
                            {"time_slot": "Night", "qty": 2}
                        ]
                    },
                    {
                        "name": "Aspirin",
                        "stock": 10,
                        "dosage_routine": [{"time_slot": "Morning", "qty": 1}]
                    }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dose_ids"].as_array().unwrap().len(), 2);

        let (_, schedules) =
            request_json(&app, "GET", "/api/patients/9000000001/schedules", None).await;
        let records = schedules.as_array().unwrap();
        assert_eq!(records.len(), 2);

        let morning = records
            .iter()
            .find(|r| r["time_slot"] == "Morning")
            .unwrap();
        assert_eq!(morning["target_time"], "08:00 AM");
        assert_eq!(morning["medications"].as_array().unwrap().len(), 2);

        let night = records.iter().find(|r| r["time_slot"] == "Night").unwrap();
        assert_eq!(night["target_time"], "08:00 PM");
        assert_eq!(night["medications"][0]["qty"], 2);
    }

    #[tokio::test]
    async fn manual_create_accepts_both_time_forms() {
        let (state, _gateway, _dir) = test_state();
        let app = engine_router(state.clone());

        for (input, expected) in [("09:30 AM", "09:30 AM"), ("21:15", "09:15 PM")] {
            let (status, _) = request_json(
                &app,
                "POST",
                "/api/schedules",
                Some(json!({
                    "patient_phone": "9000000001",
                    "time_slot": "Night",
                    "target_time": input,
                    "medications": [{"name": "Aspirin", "qty": 1, "stock": 10}]
                })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            let (_, schedules) =
                request_json(&app, "GET", "/api/patients/9000000001/schedules", None).await;
            assert!(schedules
                .as_array()
                .unwrap()
                .iter()
                .any(|r| r["target_time"] == expected));
        }
    }

    #[tokio::test]
    async fn manual_create_rejects_bad_time_and_empty_meds() {
        let (state, _gateway, _dir) = test_state();
        let app = engine_router(state.clone());

        let (status, _) = request_json(
            &app,
            "POST",
            "/api/schedules",
            Some(json!({
                "patient_phone": "9000000001",
                "time_slot": "Night",
                "target_time": "25:99",
                "medications": [{"name": "Aspirin", "qty": 1}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = request_json(
            &app,
            "POST",
            "/api/schedules",
            Some(json!({
                "patient_phone": "9000000001",
                "time_slot": "Night",
                "target_time": "08:00 PM",
                "medications": []
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn take_confirms_and_runs_inventory() {
        let (state, _gateway, _dir) = test_state();
        let app = engine_router(state.clone());

        let (_, created) = request_json(
            &app,
            "POST",
            "/api/schedules",
            Some(json!({
                "patient_phone": "9000000001",
                "time_slot": "Morning",
                "target_time": "08:00 AM",
                "medications": [{"name": "Aspirin", "qty": 2, "stock": 8}]
            })),
        )
        .await;
        let id = created["dose_ids"][0].as_str().unwrap().to_string();

        let (status, _) =
            request_json(&app, "POST", &format!("/api/schedules/{id}/take"), None).await;
        assert_eq!(status, StatusCode::OK);

        let conn = state.open_db().unwrap();
        let dose = repository::get_dose(&conn, &id.parse().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(dose.status, DoseStatus::Taken);
        assert_eq!(dose.medications[0].stock, 6);

        // Second take conflicts: the transition is single-shot.
        let (status, body) =
            request_json(&app, "POST", &format!("/api/schedules/{id}/take"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn time_edit_resets_escalation() {
        let (state, _gateway, _dir) = test_state();
        let app = engine_router(state.clone());

        let (_, created) = request_json(
            &app,
            "POST",
            "/api/schedules",
            Some(json!({
                "patient_phone": "9000000001",
                "time_slot": "Morning",
                "target_time": "08:00 AM",
                "medications": [{"name": "Aspirin", "qty": 1, "stock": 10}]
            })),
        )
        .await;
        let id: Uuid = created["dose_ids"][0].as_str().unwrap().parse().unwrap();

        // Simulate an escalated record.
        {
            let conn = state.open_db().unwrap();
            let dose = repository::get_dose(&conn, &id).unwrap().unwrap();
            let now = dose.created_at;
            assert!(
                repository::commit_escalation(&conn, &id, dose.version, 2, now, Some(now))
                    .unwrap()
            );
        }

        let (status, body) = request_json(
            &app,
            "POST",
            &format!("/api/schedules/{id}/time"),
            Some(json!({"new_time": "14:30"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["target_time"], "02:30 PM");

        let conn = state.open_db().unwrap();
        let dose = repository::get_dose(&conn, &id).unwrap().unwrap();
        assert_eq!(dose.alert_level, 0);
        assert_eq!(dose.target_time.to_string(), "02:30 PM");
    }

    #[tokio::test]
    async fn unknown_dose_is_404() {
        let (state, _gateway, _dir) = test_state();
        let app = engine_router(state.clone());
        let (status, _) = request_json(
            &app,
            "POST",
            &format!("/api/schedules/{}/take", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
