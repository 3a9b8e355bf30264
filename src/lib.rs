pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod registry;
pub mod rooms;

use std::sync::Arc;

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}};
use serde_json::Value;
use uuid::Uuid;

pub use config::Config;
pub use db::MessageStore;
pub use error::{RelayError, RelayResult};
pub use rooms::Hub;

/// Server-assigned connection id, unique per live session.
pub type ConnId = Uuid;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub store: MessageStore,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            store: hub.store().clone(),
            config: hub.config().clone(),
            hub,
        }
    }
}

/// Field access on inbound event payloads; a missing or mistyped field is a
/// validation failure reported back to the sender.
pub trait GetField {
    fn get_str_field(&self, field: &str) -> RelayResult<String>;
    fn get_opt_str_field(&self, field: &str) -> RelayResult<Option<String>>;
    fn get_obj_field(&self, field: &str) -> RelayResult<&Value>;
    fn get_id_field(&self, field: &str) -> RelayResult<ConnId>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> RelayResult<String> {
        Ok(
            self.get(field)
            .ok_or(RelayError::Validation(format!("expected {field}")))?
            .as_str()
            .ok_or(RelayError::Validation(format!("expected {field} to be a string")))?
            .to_owned()
        )
    }

    fn get_opt_str_field(&self, field: &str) -> RelayResult<Option<String>> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get_str_field(field).map(Some),
        }
    }

    fn get_obj_field(&self, field: &str) -> RelayResult<&Value> {
        match self.get(field) {
            None | Some(Value::Null) => Err(RelayError::Validation(format!("expected {field}"))),
            Some(value) => Ok(value),
        }
    }

    fn get_id_field(&self, field: &str) -> RelayResult<ConnId> {
        let raw = self.get_str_field(field)?;
        Uuid::parse_str(&raw)
            .map_err(|_| RelayError::Validation(format!("{field} is not a connection id: {raw}")))
    }
}


pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(sqlx::Error);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn str_field_present() {
        let v = json!({ "roomId": "r1" });
        assert_eq!(v.get_str_field("roomId").unwrap(), "r1");
    }

    #[test]
    fn missing_field_is_validation_error() {
        let v = json!({});
        assert!(matches!(v.get_str_field("roomId"), Err(RelayError::Validation(_))));
        assert!(matches!(v.get_obj_field("offer"), Err(RelayError::Validation(_))));
    }

    #[test]
    fn non_string_field_is_rejected() {
        let v = json!({ "roomId": 7 });
        assert!(v.get_str_field("roomId").is_err());
    }

    #[test]
    fn optional_field_accepts_null() {
        let v = json!({ "from": null });
        assert_eq!(v.get_opt_str_field("from").unwrap(), None);
        assert_eq!(v.get_opt_str_field("missing").unwrap(), None);
    }

    #[test]
    fn id_field_parses_uuid() {
        let id = Uuid::now_v7();
        let v = json!({ "to": id.to_string() });
        assert_eq!(v.get_id_field("to").unwrap(), id);

        let bad = json!({ "to": "bob" });
        assert!(matches!(bad.get_id_field("to"), Err(RelayError::Validation(_))));
    }

    #[test]
    fn store_error_is_internal_server_error() {
        let err = AppError::from(sqlx::Error::PoolClosed);
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
