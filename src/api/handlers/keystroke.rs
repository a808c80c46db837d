use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{error_response, ErrorResponse};
use crate::biometrics::{Action, ContinuousLearningEngine};
use crate::models::{AuthenticationResult, KeystrokePattern, Timestamp};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystrokeRequest {
    pub action: Action,
    pub user_id: Uuid,
    pub keystroke_data: KeystrokePattern,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystrokeResponse {
    pub success: bool,
    pub confidence_score: f64,
    pub anomalies: Vec<String>,
    pub message: String,
    pub timestamp: Timestamp,
}

impl KeystrokeResponse {
    fn from_result(action: Action, result: AuthenticationResult) -> Self {
        let message = match (action, result.success) {
            (Action::Train, true) => "Training sample accepted".to_string(),
            (Action::Verify, true) => "Keystroke pattern verified".to_string(),
            (_, false) => result
                .anomaly_details
                .as_ref()
                .map(|details| details.description.clone())
                .unwrap_or_else(|| "Confidence below profile threshold".to_string()),
        };

        KeystrokeResponse {
            success: result.success,
            confidence_score: result.confidence_score,
            anomalies: result
                .anomaly_details
                .map(|details| details.fields.into_iter().collect())
                .unwrap_or_default(),
            message,
            timestamp: result.timestamp,
        }
    }
}

// Score a typing sample and, where allowed, learn from it
pub async fn submit_keystrokes(
    req: web::Json<KeystrokeRequest>,
    engine: web::Data<ContinuousLearningEngine>,
) -> impl Responder {
    let req = req.into_inner();
    if req.user_id != req.keystroke_data.user_id {
        return HttpResponse::BadRequest().json(ErrorResponse::new("userId does not match keystrokeData.userId"));
    }

    let action = req.action;
    match engine.authenticate(action, req.keystroke_data).await {
        Ok(result) => HttpResponse::Ok().json(KeystrokeResponse::from_result(action, result)),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::register_routes;
    use crate::biometrics::fixtures::human;
    use crate::biometrics::EngineSettings;
    use crate::db::repositories::InMemoryProfileStore;
    use crate::security::cipher::ChaChaPatternEncryptor;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> web::Data<ContinuousLearningEngine> {
        web::Data::new(ContinuousLearningEngine::new(
            Arc::new(InMemoryProfileStore::new()),
            Arc::new(ChaChaPatternEncryptor::generate()),
            EngineSettings::default(),
        ))
    }

    fn body(action: &str, user: Uuid, pattern: &KeystrokePattern) -> serde_json::Value {
        json!({
            "action": action,
            "userId": user,
            "keystrokeData": pattern,
        })
    }

    #[actix_web::test]
    async fn test_train_then_verify() {
        let app = test::init_service(App::new().app_data(engine()).configure(register_routes)).await;
        let user = Uuid::new_v4();

        for i in 0..3 {
            let req = test::TestRequest::post()
                .uri("/api/v1/keystroke")
                .set_json(body("train", user, &human(user, i * 60_000)))
                .to_request();
            let resp: KeystrokeResponse = test::call_and_read_body_json(&app, req).await;
            assert!(resp.success);
            assert_eq!(resp.message, "Training sample accepted");
        }

        let req = test::TestRequest::post()
            .uri("/api/v1/keystroke")
            .set_json(body("verify", user, &human(user, 600_000)))
            .to_request();
        let resp: KeystrokeResponse = test::call_and_read_body_json(&app, req).await;
        assert!(resp.success);
        assert!(resp.anomalies.is_empty());
        assert!(resp.confidence_score > 90.0);
    }

    #[actix_web::test]
    async fn test_verify_unknown_user_is_404() {
        let app = test::init_service(App::new().app_data(engine()).configure(register_routes)).await;
        let user = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/api/v1/keystroke")
            .set_json(body("verify", user, &human(user, 0)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_mismatched_user_is_400() {
        let app = test::init_service(App::new().app_data(engine()).configure(register_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/keystroke")
            .set_json(body("train", Uuid::new_v4(), &human(Uuid::new_v4(), 0)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_malformed_timings_are_400() {
        let app = test::init_service(App::new().app_data(engine()).configure(register_routes)).await;
        let user = Uuid::new_v4();
        let mut pattern = human(user, 0);
        pattern.timings[2].release_time = pattern.timings[2].press_time - 1;

        let req = test::TestRequest::post()
            .uri("/api/v1/keystroke")
            .set_json(body("train", user, &pattern))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/v1/keystroke")
            .set_json(json!({ "action": "dance", "userId": user }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_bot_input_reports_anomalies() {
        let app = test::init_service(App::new().app_data(engine()).configure(register_routes)).await;
        let user = Uuid::new_v4();
        let bot = crate::biometrics::fixtures::typed(user, "qwertyuiopasdfghjklz", 50, 100, 0);

        let req = test::TestRequest::post()
            .uri("/api/v1/keystroke")
            .set_json(body("train", user, &bot))
            .to_request();
        let resp: KeystrokeResponse = test::call_and_read_body_json(&app, req).await;
        assert!(!resp.success);
        assert!(resp.anomalies.contains(&"machine_generated".to_string()));
    }

    #[actix_web::test]
    async fn test_health() {
        let app = test::init_service(App::new().configure(register_routes)).await;
        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
