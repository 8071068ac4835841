//! Request and response messages exchanged over the fabric.

use uuid::Uuid;

/// A request delivered to a registered topic.
#[derive(Clone, Debug)]
pub struct Request {
    /// Unique identifier, echoed by the response for correlation.
    pub message_id: String,
    /// Topic the request was addressed to.
    pub destination_topic: String,
    /// Raw payload (JSON for this service).
    pub payload: Vec<u8>,
}

impl Request {
    pub fn new(destination_topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            destination_topic: destination_topic.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseBody {
    Payload(Vec<u8>),
    Error { code: i64, message: String },
}

/// Reply to a [`Request`], correlated through `request_message_id`.
#[derive(Clone, Debug)]
pub struct Response {
    pub request_message_id: String,
    pub body: ResponseBody,
}

impl Response {
    pub fn success(request: &Request, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            request_message_id: request.message_id.clone(),
            body: ResponseBody::Payload(payload.into()),
        }
    }

    pub fn error(request: &Request, code: i64, message: impl Into<String>) -> Self {
        Self {
            request_message_id: request.message_id.clone(),
            body: ResponseBody::Error {
                code,
                message: message.into(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, ResponseBody::Error { .. })
    }

    /// Success payload, `None` for error responses.
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.body {
            ResponseBody::Payload(bytes) => Some(bytes),
            ResponseBody::Error { .. } => None,
        }
    }

    pub fn payload_str(&self) -> Option<&str> {
        self.payload().and_then(|p| std::str::from_utf8(p).ok())
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Error { message, .. } => Some(message),
            ResponseBody::Payload(_) => None,
        }
    }

    pub fn error_code(&self) -> Option<i64> {
        match &self.body {
            ResponseBody::Error { code, .. } => Some(*code),
            ResponseBody::Payload(_) => None,
        }
    }
}
