use actix_web::{error::InternalError, web, HttpResponse};

use super::handlers::{health, keystroke, profile, ErrorResponse};

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).service(
        // API version prefix - all routes will be under /api/v1
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/keystroke", web::post().to(keystroke::submit_keystrokes))
            // Profile administration
            .service(
                web::scope("/profiles")
                    .route("/{user_id}", web::get().to(profile::get_profile))
                    .route("/{user_id}/lock", web::post().to(profile::lock_profile))
                    .route("/{user_id}/unlock", web::post().to(profile::unlock_profile))
                    .route("/{user_id}/reset", web::post().to(profile::reset_profile)),
            ),
    );
}

/// Bad JSON bodies get the same error shape as the handlers use
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(256 * 1024)
        .error_handler(|err, _req| {
            let response = HttpResponse::BadRequest().json(ErrorResponse::new(format!("Invalid request body: {}", err)));
            InternalError::from_response(err, response).into()
        })
}
