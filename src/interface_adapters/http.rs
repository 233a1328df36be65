// JSON error body shared by every control endpoint.

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
