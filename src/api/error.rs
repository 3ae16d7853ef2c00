use thiserror::Error;

/// How much of an error response body to keep in the message.
const MAX_ERROR_BODY_LENGTH: usize = 400;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unauthorized - token missing or expired")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response ({status}): {body}")]
    Unexpected { status: u16, body: String },
}

impl ApiError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden(body),
            404 => ApiError::NotFound(body),
            status @ 500..=599 => ApiError::Server { status, body },
            status => ApiError::Unexpected { status, body },
        }
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut cut = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... ({} total bytes)", &body[..cut], body.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ApiError::from_status(reqwest::StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(reqwest::StatusCode::FORBIDDEN, "nope"),
            ApiError::Forbidden(_)
        ));
        assert!(matches!(
            ApiError::from_status(reqwest::StatusCode::BAD_GATEWAY, ""),
            ApiError::Server { status: 502, .. }
        ));
        assert!(matches!(
            ApiError::from_status(reqwest::StatusCode::IM_A_TEAPOT, ""),
            ApiError::Unexpected { status: 418, .. }
        ));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "출".repeat(400); // 3 bytes per char, 1200 bytes total
        let truncated = truncate_body(&body);
        assert!(truncated.contains("total bytes"));
        // Must not have split inside a UTF-8 sequence.
        assert!(truncated.starts_with('출'));
    }
}
