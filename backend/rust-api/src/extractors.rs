use axum::{
    extract::{FromRequest, Request},
    Json,
};

use crate::handlers::ApiError;

/// Strict JSON extractor. Axum's default rejection renders plain text; this
/// one funnels body problems through `ApiError` so a malformed request gets
/// the same JSON envelope as every other error in the API.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => {
                tracing::warn!("Rejecting request body: {}", rejection);
                Err(ApiError::bad_request(format!(
                    "Failed to parse JSON request body: {}",
                    rejection
                )))
            }
        }
    }
}
