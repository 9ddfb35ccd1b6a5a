//! HTTP 处理器模块

pub mod audit;
pub mod auth;
pub mod contact;
pub mod content;
pub mod dashboard;
pub mod health;
pub mod user;

use crate::{
    error::{AppError, FieldError},
    middleware::RequestMeta,
};
use axum::{
    body::Bytes,
    extract::{FromRequest, Query, Request},
    http::Uri,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::convert::Infallible;
use uuid::Uuid;
use validator::Validate;

/// JSON 请求体
///
/// 解析错误不在提取阶段拒绝，而是留给处理器在鉴权之后报告，
/// 保证未认证的请求总是先得到 401。
pub struct Payload<T> {
    raw: Value,
    parsed: Result<T, AppError>,
}

impl<T> Payload<T> {
    /// 原始 JSON（无法解析时为 Null）
    pub fn raw(&self) -> Value {
        self.raw.clone()
    }

    /// 解析结果，忽略错误
    pub fn ok(self) -> Option<T> {
        self.parsed.ok()
    }

    /// 解析并执行字段校验
    pub fn validated(self) -> Result<T, AppError>
    where
        T: Validate,
    {
        let value = self.parsed?;
        value.validate()?;
        Ok(value)
    }
}

fn body_error(message: impl Into<String>) -> AppError {
    AppError::Validation(vec![FieldError::new("body", message)])
}

impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = match Bytes::from_request(req, state).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Ok(Self {
                    raw: Value::Null,
                    parsed: Err(body_error(e.body_text())),
                })
            }
        };

        if bytes.is_empty() {
            return Ok(Self {
                raw: Value::Null,
                parsed: Err(body_error("Request body is required")),
            });
        }

        let raw = match serde_json::from_slice::<Value>(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                return Ok(Self {
                    raw: Value::Null,
                    parsed: Err(body_error(format!("Invalid JSON: {}", e))),
                })
            }
        };

        let parsed = serde_json::from_value::<T>(raw.clone()).map_err(|e| body_error(e.to_string()));
        Ok(Self { raw, parsed })
    }
}

/// 从请求 URL 解析查询参数
pub(crate) fn parse_query<T: DeserializeOwned>(meta: &RequestMeta) -> Result<T, AppError> {
    let uri: Uri = meta
        .url
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid request URI".to_string()))?;

    Query::<T>::try_from_uri(&uri)
        .map(|Query(q)| q)
        .map_err(|e| AppError::Validation(vec![FieldError::new("query", e.body_text())]))
}

/// 路径中的 UUID；无法解析时按资源不存在处理
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize, Validate)]
    struct Signup {
        #[validate(length(min = 3))]
        name: String,
    }

    async fn payload(body: &'static str) -> Payload<Signup> {
        let req = Request::builder().body(Body::from(body)).unwrap();
        match Payload::<Signup>::from_request(req, &()).await {
            Ok(p) => p,
            Err(never) => match never {},
        }
    }

    fn meta(url: &str) -> RequestMeta {
        RequestMeta {
            method: "GET".to_string(),
            url: url.to_string(),
            query: HashMap::new(),
            ip: "unknown".to_string(),
            user_agent: "unknown".to_string(),
            authorization: None,
        }
    }

    #[tokio::test]
    async fn test_payload_defers_errors() {
        let p = payload("{\"name\": \"abc\", \"password\": \"x\"}").await;
        assert_eq!(p.raw()["name"], "abc");
        assert_eq!(p.validated().unwrap().name, "abc");

        assert!(matches!(payload("{\"name\": \"ab\"}").await.validated(), Err(AppError::Validation(_))));
        assert!(matches!(payload("not json").await.validated(), Err(AppError::Validation(_))));

        let empty = payload("").await;
        assert!(empty.raw().is_null());
        assert!(empty.ok().is_none());
    }

    #[test]
    fn test_parse_query_and_id() {
        #[derive(Deserialize)]
        struct Q {
            page: Option<u32>,
        }

        let q: Q = parse_query(&meta("/api/v1/users?page=3")).unwrap();
        assert_eq!(q.page, Some(3));
        assert!(parse_query::<Q>(&meta("/api/v1/users?page=abc")).is_err());

        assert!(matches!(parse_id("nope", "User"), Err(AppError::NotFound(_))));
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "User").unwrap(), id);
    }
}
