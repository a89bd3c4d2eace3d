//! Worker回调入口，只凭 `x-srv-token` 认证

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{
        header::CONTENT_TYPE,
        HeaderMap, HeaderName, HeaderValue,
    },
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use taskmesh_core::{
    models::{ResultStatus, NEXT_SRV_TOKEN_HEADER},
    Result, TaskMeshError,
};

use super::srv_token;
use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
    task_service::{LogLine, SrvTokenCheck},
};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Deserialize)]
pub struct SetResultStatusRequest {
    pub task_unique_id: String,
    pub status: ResultStatus,
}

/// 失败响应在令牌已换发时同样带上 `x-next-srv-token`
pub async fn set_result_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<SetResultStatusRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    let outcome = state
        .service
        .set_result_status(srv_token(&headers), &request.task_unique_id, request.status)
        .await;

    match outcome {
        Ok(receipt) => Json(receipt).into_response(),
        Err(rejected) => {
            let mut response = ApiError::from(rejected.error).into_response();
            if let Some(next) = rejected.next_srv_token {
                match next_token_header(&next) {
                    Ok(value) => {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(NEXT_SRV_TOKEN_HEADER), value);
                    }
                    Err(e) => tracing::warn!(error = %e, "换发的回调令牌未能写入错误响应"),
                }
            }
            response
        }
    }
}

pub async fn is_valid_srv_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SrvTokenCheck>> {
    let check = state.service.is_valid_srv_token(srv_token(&headers)).await?;
    Ok(Json(check))
}

/// 请求体和响应体都是NDJSON；新令牌通过 `x-next-srv-token` 响应头返回
pub async fn append_task_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    let (next_srv_token, acks) = state
        .service
        .append_task_log(srv_token(&headers), ndjson_lines(body))
        .await?;

    let lines = acks.map(|item| {
        let mut line = match item {
            Ok(ack) => serde_json::to_vec(&ack),
            Err(e) => serde_json::to_vec(&ApiError::from(e).body()),
        }
        .unwrap_or_default();
        line.push(b'\n');
        Ok::<_, Infallible>(line)
    });

    let next = next_token_header(&next_srv_token)?;
    let mut response = Response::new(Body::from_stream(lines));
    let response_headers = response.headers_mut();
    response_headers.insert(CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE));
    response_headers.insert(HeaderName::from_static(NEXT_SRV_TOKEN_HEADER), next);
    Ok(response)
}

fn next_token_header(token: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(token)
        .map_err(|e| TaskMeshError::Internal(format!("回调令牌无法写入响应头: {e}")))
}

fn parse_line(line: &[u8]) -> Result<LogLine> {
    serde_json::from_slice(line)
        .map_err(|e| TaskMeshError::Validation(format!("日志行格式错误: {e}")))
}

/// 把请求体拆成逐行解析的日志流，跳过空行
fn ndjson_lines(body: Body) -> impl Stream<Item = Result<LogLine>> + Send + 'static {
    let chunks = body.into_data_stream();
    stream::unfold(
        (chunks, Vec::<u8>::new(), false),
        |(mut chunks, mut buf, mut eof)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = line.trim_ascii();
                    if line.is_empty() {
                        continue;
                    }
                    let parsed = parse_line(line);
                    return Some((parsed, (chunks, buf, eof)));
                }
                if eof {
                    let rest = std::mem::take(&mut buf);
                    let rest = rest.trim_ascii();
                    if rest.is_empty() {
                        return None;
                    }
                    let parsed = parse_line(rest);
                    return Some((parsed, (chunks, buf, eof)));
                }
                match chunks.next().await {
                    Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        eof = true;
                        buf.clear();
                        let err = TaskMeshError::Validation(format!("读取请求体失败: {e}"));
                        return Some((Err(err), (chunks, buf, eof)));
                    }
                    None => eof = true,
                }
            }
        },
    )
}
