use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error_response;
use crate::biometrics::learning::average_speed;
use crate::biometrics::ContinuousLearningEngine;
use crate::models::{BiometricProfile, Timestamp};

/// Profile view without raw timings
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub user_id: Uuid,
    pub status: String,
    pub confidence_score: f64,
    pub pattern_count: usize,
    pub average_wpm: f64,
    pub last_updated: Timestamp,
}

impl From<&BiometricProfile> for ProfileSummary {
    fn from(profile: &BiometricProfile) -> Self {
        ProfileSummary {
            user_id: profile.user_id,
            status: profile.status.to_string(),
            confidence_score: profile.confidence_score,
            pattern_count: profile.pattern_count(),
            average_wpm: average_speed(&profile.keystroke_patterns),
            last_updated: profile.last_updated,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LockRequest {
    pub reason: Option<String>,
}

fn respond(result: Result<BiometricProfile, crate::biometrics::BiometricError>) -> HttpResponse {
    match result {
        Ok(profile) => HttpResponse::Ok().json(ProfileSummary::from(&profile)),
        Err(e) => error_response(e),
    }
}

pub async fn get_profile(path: web::Path<Uuid>, engine: web::Data<ContinuousLearningEngine>) -> impl Responder {
    respond(engine.get_profile(path.into_inner()).await)
}

pub async fn lock_profile(
    path: web::Path<Uuid>,
    body: Option<web::Json<LockRequest>>,
    engine: web::Data<ContinuousLearningEngine>,
) -> impl Responder {
    let reason = body
        .and_then(|b| b.into_inner().reason)
        .unwrap_or_else(|| "locked by administrator".to_string());
    respond(engine.lock_profile(path.into_inner(), &reason).await)
}

pub async fn unlock_profile(path: web::Path<Uuid>, engine: web::Data<ContinuousLearningEngine>) -> impl Responder {
    respond(engine.unlock_profile(path.into_inner()).await)
}

pub async fn reset_profile(path: web::Path<Uuid>, engine: web::Data<ContinuousLearningEngine>) -> impl Responder {
    respond(engine.reset_profile(path.into_inner()).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::keystroke::KeystrokeResponse;
    use crate::api::routes::register_routes;
    use crate::biometrics::fixtures::human;
    use crate::biometrics::{Action, EngineSettings};
    use crate::db::repositories::InMemoryProfileStore;
    use crate::security::cipher::ChaChaPatternEncryptor;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;
    use std::sync::Arc;

    async fn enrolled(samples: u64) -> (web::Data<ContinuousLearningEngine>, Uuid) {
        let engine = ContinuousLearningEngine::new(
            Arc::new(InMemoryProfileStore::new()),
            Arc::new(ChaChaPatternEncryptor::generate()),
            EngineSettings::default(),
        );
        let user = Uuid::new_v4();
        for i in 0..samples {
            engine.authenticate(Action::Train, human(user, i * 60_000)).await.unwrap();
        }
        (web::Data::new(engine), user)
    }

    #[actix_web::test]
    async fn test_get_profile_summary() {
        let (engine, user) = enrolled(3).await;
        let app = test::init_service(App::new().app_data(engine).configure(register_routes)).await;

        let req = test::TestRequest::get().uri(&format!("/api/v1/profiles/{}", user)).to_request();
        let summary: ProfileSummary = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary.user_id, user);
        assert_eq!(summary.status, "learning");
        assert_eq!(summary.pattern_count, 3);
        assert!((summary.confidence_score - 56.0).abs() < 1e-9);
        assert!(summary.average_wpm > 0.0);
    }

    #[actix_web::test]
    async fn test_unknown_profile_is_404() {
        let (engine, _) = enrolled(0).await;
        let app = test::init_service(App::new().app_data(engine).configure(register_routes)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/profiles/{}/lock", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_lock_blocks_verification_until_unlocked() {
        let (engine, user) = enrolled(3).await;
        let app = test::init_service(App::new().app_data(engine).configure(register_routes)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/profiles/{}/lock", user))
            .set_json(json!({ "reason": "credential stuffing" }))
            .to_request();
        let summary: ProfileSummary = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary.status, "locked");

        let verify = |start: u64| {
            test::TestRequest::post()
                .uri("/api/v1/keystroke")
                .set_json(json!({ "action": "verify", "userId": user, "keystrokeData": human(user, start) }))
                .to_request()
        };

        let resp: KeystrokeResponse = test::call_and_read_body_json(&app, verify(600_000)).await;
        assert!(!resp.success);
        assert_eq!(resp.anomalies, vec!["profile_status".to_string()]);

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/profiles/{}/unlock", user))
            .to_request();
        let summary: ProfileSummary = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary.status, "learning");

        let resp: KeystrokeResponse = test::call_and_read_body_json(&app, verify(660_000)).await;
        assert!(resp.success);
    }

    #[actix_web::test]
    async fn test_reset_profile() {
        let (engine, user) = enrolled(4).await;
        let app = test::init_service(App::new().app_data(engine).configure(register_routes)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/profiles/{}/reset", user))
            .to_request();
        let summary: ProfileSummary = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary.pattern_count, 0);
        assert_eq!(summary.confidence_score, 0.0);
    }
}
