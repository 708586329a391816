use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use novasched_domain::Error;
use serde::de::DeserializeOwned;

/// `Json`-like extractor that maps every decode failure (bad JSON, missing
/// required field, wrong type) to `Error::MalformedInput` and a 400, instead
/// of axum's default `Json` extractor, which reports a missing/mistyped
/// field as 422. Spec §7 treats those the same way: MalformedInput, 400.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|err| malformed(err.to_string()))?;
        let value = serde_json::from_slice::<T>(&bytes).map_err(|err| malformed(err.to_string()))?;
        Ok(ValidatedJson(value))
    }
}

fn malformed(detail: String) -> Response {
    let err = Error::MalformedInput(detail);
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}
