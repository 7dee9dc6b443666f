use axum::{extract::State, http::StatusCode};

use crate::admission;
use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::models::{Registrant, RegistrantInput};
use crate::notify::{spawn_notice, RegistrationNotice};

/// POST /tournaments/{id}/register
///
/// Admit a registrant. Over-capacity admissions land on the waitlist
/// rather than being refused; the response carries the decided status.
pub async fn register(
    State(state): State<AppState>,
    Path(tournament_id): Path<String>,
    Json(input): Json<RegistrantInput>,
) -> Result<(StatusCode, Json<Registrant>)> {
    let mut conn = state.db.get()?;
    let registrant = admission::admit(&mut conn, &tournament_id, &input)?;

    spawn_notice(
        state.http_client.clone(),
        state.notify_webhook_url.clone(),
        RegistrationNotice {
            event: "registration_received".to_string(),
            tournament_id: registrant.tournament_id.clone(),
            registrant_id: registrant.id.clone(),
            registrant_name: registrant.name.clone(),
            registrant_email: registrant.email.clone(),
            admission_status: registrant.admission_status.to_string(),
            amount_cents: None,
            timestamp: chrono::Utc::now().timestamp(),
        },
    );

    Ok((StatusCode::CREATED, Json(registrant)))
}
