//! Gateway callbacks: dose confirmation and language capture.
//!
//! Both are invoked by the Confirmation Gateway with the keypress the
//! patient made during a call, out-of-band from the poller. They always
//! answer `200 text/xml`; lookup failures are reported to the caller as a
//! generic spoken error with no state mutated.

use axum::extract::{Path, State};
use axum::Form;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, Twiml};
use crate::db::repository;
use crate::engine::{inventory, poller};
use crate::gateway::scripts;
use crate::gateway::twiml::{Say, VoiceResponse};
use crate::models::{DoseRecord, DoseStatus, Language, Patient};

/// The single-digit form field the gateway posts. Absent on gather timeout.
#[derive(Debug, Deserialize)]
pub struct GatherInput {
    #[serde(rename = "Digits")]
    pub digits: Option<String>,
}

/// `POST /api/alerts/webhook/:dose_id` — dose confirmation keypress.
pub async fn confirm(
    State(ctx): State<ApiContext>,
    Path(dose_id): Path<String>,
    Form(input): Form<GatherInput>,
) -> Twiml {
    match confirm_inner(&ctx, &dose_id, input.digits.as_deref()).await {
        Ok(voice) => Twiml(voice),
        Err(e) => {
            warn!(dose_id, error = %e, "confirmation callback failed");
            Twiml(error_voice())
        }
    }
}

async fn confirm_inner(
    ctx: &ApiContext,
    dose_id: &str,
    digits: Option<&str>,
) -> Result<VoiceResponse, ApiError> {
    let mut conn = ctx.core.open_db()?;
    let (dose, patient) = lookup(&conn, dose_id)?;
    let lang = patient.language.unwrap_or(Language::English);

    if digits != Some("1") {
        // Wrong key or gather timeout: the record stays pending and the
        // poller's next escalation step picks it up.
        return Ok(spoken(lang, scripts::confirm_failure(lang)));
    }

    if repository::confirm_taken(&conn, &dose.id)? {
        info!(dose_id = %dose.id, "dose confirmed taken");
        inventory::process_taken(
            &mut conn,
            ctx.core.gateway(),
            &dose,
            &patient,
            &ctx.core.config.country_prefix,
        )
        .await?;
        return Ok(spoken(lang, scripts::confirm_success(lang)));
    }

    // Lost the transition: already taken is an idempotent success, any
    // other terminal state is not confirmable.
    if dose.status == DoseStatus::Taken {
        Ok(spoken(lang, scripts::confirm_success(lang)))
    } else {
        Ok(spoken(lang, scripts::confirm_failure(lang)))
    }
}

/// `POST /api/alerts/language/:dose_id` — language-menu keypress.
///
/// Persists the choice permanently, then continues straight into the
/// confirmation gather, speaking the dose reminder in the chosen language.
pub async fn language(
    State(ctx): State<ApiContext>,
    Path(dose_id): Path<String>,
    Form(input): Form<GatherInput>,
) -> Twiml {
    match language_inner(&ctx, &dose_id, input.digits.as_deref()).await {
        Ok(voice) => Twiml(voice),
        Err(e) => {
            warn!(dose_id, error = %e, "language callback failed");
            Twiml(error_voice())
        }
    }
}

async fn language_inner(
    ctx: &ApiContext,
    dose_id: &str,
    digits: Option<&str>,
) -> Result<VoiceResponse, ApiError> {
    let conn = ctx.core.open_db()?;
    let (dose, mut patient) = lookup(&conn, dose_id)?;

    let lang = Language::from_digit(digits.unwrap_or_default());
    repository::set_language(&conn, &patient.phone, lang)?;
    patient.language = Some(lang);
    info!(dose_id = %dose.id, phone = %patient.phone, language = lang.as_str(),
        "language preference captured");

    Ok(poller::confirmation_call(&ctx.core, &dose, &patient, false))
}

fn lookup(
    conn: &rusqlite::Connection,
    dose_id: &str,
) -> Result<(DoseRecord, Patient), ApiError> {
    let id = Uuid::parse_str(dose_id)
        .map_err(|_| ApiError::BadRequest(format!("invalid dose id: {dose_id}")))?;
    let dose = repository::get_dose(conn, &id)?
        .ok_or_else(|| ApiError::NotFound(format!("dose {id} not found")))?;
    let patient = repository::get_patient(conn, &dose.patient_phone)?
        .ok_or_else(|| ApiError::NotFound(format!("patient {} not found", dose.patient_phone)))?;
    Ok((dose, patient))
}

fn spoken(lang: Language, text: String) -> VoiceResponse {
    VoiceResponse::new().say(Say::new(lang.voice_code(), text))
}

fn error_voice() -> VoiceResponse {
    VoiceResponse::new().say(Say::new(Language::English.voice_code(), scripts::spoken_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{NaiveDate, NaiveDateTime};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::api::engine_router;
    use crate::config::EngineConfig;
    use crate::core_state::CoreState;
    use crate::engine::poller::run_tick;
    use crate::gateway::mock::RecordingGateway;
    use crate::models::{
        ClockTime, DoseSource, MedicationLine, ReminderChannel, TimeSlot,
    };

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn test_state() -> (Arc<CoreState>, Arc<RecordingGateway>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::for_tests(dir.path().join("engine.db"));
        let gateway = Arc::new(RecordingGateway::new());
        (
            Arc::new(CoreState::new(config, gateway.clone())),
            gateway,
            dir,
        )
    }

    fn seed(state: &CoreState, language: Option<Language>) -> DoseRecord {
        let conn = state.open_db().unwrap();
        repository::upsert_patient(
            &conn,
            &Patient {
                phone: "9000000001".into(),
                name: "Asha".into(),
                language,
                reminder_channel: ReminderChannel::Call,
                caretaker_phone: None,
            },
        )
        .unwrap();
        let dose = DoseRecord::new(
            "9000000001".into(),
            DoseSource::Fulfillment,
            TimeSlot::Morning,
            ClockTime::parse_12h("08:00 AM").unwrap(),
            vec![MedicationLine {
                name: "Aspirin".into(),
                qty: 1,
                stock: 10,
                is_continuous: false,
                low_stock_notified: false,
            }],
            at(6, 0),
        );
        repository::insert_dose(&conn, &dose).unwrap();
        dose
    }

    async fn post_digit(app: &axum::Router, path: &str, digit: Option<&str>) -> (StatusCode, String) {
        let body = match digit {
            Some(d) => format!("Digits={d}"),
            None => String::new(),
        };
        let response = app
            .clone()
            .oneshot(
                Request::post(path)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn digit_one_confirms_and_decrements_stock() {
        let (state, _gateway, _dir) = test_state();
        let dose = seed(&state, Some(Language::English));
        let app = engine_router(state.clone());

        let (status, body) =
            post_digit(&app, &format!("/api/alerts/webhook/{}", dose.id), Some("1")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("marked as taken"));

        let conn = state.open_db().unwrap();
        let loaded = repository::get_dose(&conn, &dose.id).unwrap().unwrap();
        assert_eq!(loaded.status, DoseStatus::Taken);
        assert_eq!(loaded.alert_level, 0);
        assert_eq!(loaded.medications[0].stock, 9);
    }

    #[tokio::test]
    async fn wrong_digit_leaves_record_pending() {
        let (state, _gateway, _dir) = test_state();
        let dose = seed(&state, Some(Language::English));
        let app = engine_router(state.clone());

        let (status, body) =
            post_digit(&app, &format!("/api/alerts/webhook/{}", dose.id), Some("5")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("did not receive a valid input"));

        let conn = state.open_db().unwrap();
        let loaded = repository::get_dose(&conn, &dose.id).unwrap().unwrap();
        assert_eq!(loaded.status, DoseStatus::Pending);
        assert_eq!(loaded.medications[0].stock, 10);
    }

    #[tokio::test]
    async fn timeout_without_digits_is_not_a_confirmation() {
        let (state, _gateway, _dir) = test_state();
        let dose = seed(&state, Some(Language::Telugu));
        let app = engine_router(state.clone());

        let (status, body) =
            post_digit(&app, &format!("/api/alerts/webhook/{}", dose.id), None).await;
        assert_eq!(status, StatusCode::OK);
        // Failure phrase in the patient's language.
        assert!(body.contains("te-IN"));

        let conn = state.open_db().unwrap();
        let loaded = repository::get_dose(&conn, &dose.id).unwrap().unwrap();
        assert_eq!(loaded.status, DoseStatus::Pending);
    }

    #[tokio::test]
    async fn repeated_confirmation_decrements_once() {
        let (state, _gateway, _dir) = test_state();
        let dose = seed(&state, Some(Language::English));
        let app = engine_router(state.clone());
        let path = format!("/api/alerts/webhook/{}", dose.id);

        post_digit(&app, &path, Some("1")).await;
        let (status, body) = post_digit(&app, &path, Some("1")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("marked as taken"));

        let conn = state.open_db().unwrap();
        let loaded = repository::get_dose(&conn, &dose.id).unwrap().unwrap();
        assert_eq!(loaded.medications[0].stock, 9);
    }

    #[tokio::test]
    async fn unknown_dose_speaks_generic_error() {
        let (state, _gateway, _dir) = test_state();
        seed(&state, Some(Language::English));
        let app = engine_router(state.clone());

        let (status, body) = post_digit(
            &app,
            &format!("/api/alerts/webhook/{}", Uuid::new_v4()),
            Some("1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Error processing request"));

        let (status, body) = post_digit(&app, "/api/alerts/webhook/not-a-uuid", Some("1")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Error processing request"));
    }

    #[tokio::test]
    async fn language_capture_persists_and_continues_to_confirmation() {
        let (state, _gateway, _dir) = test_state();
        let dose = seed(&state, None);
        let app = engine_router(state.clone());

        let (status, body) =
            post_digit(&app, &format!("/api/alerts/language/{}", dose.id), Some("2")).await;
        assert_eq!(status, StatusCode::OK);
        // The reminder continues in Hindi, gathering at the confirmation URL.
        assert!(body.contains("Namaste"));
        assert!(body.contains(&format!("/api/alerts/webhook/{}", dose.id)));
        assert!(body.contains("1 Aspirin"));

        let conn = state.open_db().unwrap();
        let patient = repository::get_patient(&conn, "9000000001").unwrap().unwrap();
        assert_eq!(patient.language, Some(Language::Hindi));
    }

    /// The full first-contact flow: tick at the target minute plays the
    /// language menu, the menu keypress captures the language and re-speaks
    /// the reminder, and the confirmation keypress takes the dose.
    #[tokio::test]
    async fn first_contact_scenario_end_to_end() {
        let (state, gateway, _dir) = test_state();
        let dose = seed(&state, None);
        let app = engine_router(state.clone());

        run_tick(&state, at(8, 0)).await.unwrap();
        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.contains(&format!("/api/alerts/language/{}", dose.id)));
        {
            let conn = state.open_db().unwrap();
            let loaded = repository::get_dose(&conn, &dose.id).unwrap().unwrap();
            assert_eq!(loaded.alert_level, 1);
        }

        let (_, body) =
            post_digit(&app, &format!("/api/alerts/language/{}", dose.id), Some("2")).await;
        assert!(body.contains("Namaste"));

        let (_, body) =
            post_digit(&app, &format!("/api/alerts/webhook/{}", dose.id), Some("1")).await;
        assert!(body.contains("hi-IN"));

        let conn = state.open_db().unwrap();
        let loaded = repository::get_dose(&conn, &dose.id).unwrap().unwrap();
        assert_eq!(loaded.status, DoseStatus::Taken);
        assert_eq!(loaded.alert_level, 0);
        assert_eq!(loaded.medications[0].stock, 9);

        // Confirmed: the poller never escalates this record again.
        run_tick(&state, at(8, 1)).await.unwrap();
        run_tick(&state, at(8, 2)).await.unwrap();
        assert_eq!(gateway.calls().len(), 1);
    }
}
