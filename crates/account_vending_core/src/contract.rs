use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_REASON: &str = "See the details in CloudWatch Log Stream";
/// `Data.Message` of every SUCCESS callback, Create included.
pub const SUCCESS_MESSAGE: &str = "Resource update successful!";
pub const DELETE_REASON: &str = "Delete Request Initiated. Deleting Lambda Function.";
pub const MAX_REASON_CHARS: usize = 1_024;

pub type ResponseData = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

/// Custom-resource request sent by CloudFormation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub request_type: RequestType,
    pub service_token: String,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_properties: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Body PUT to the pre-signed `ResponseURL`. Field names are fixed by
/// CloudFormation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl CallbackResponse {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("callback response should serialize")
    }
}

pub fn success_response(event: &LifecycleEvent, data: ResponseData) -> CallbackResponse {
    build_response(event, ResponseStatus::Success, DEFAULT_REASON, Some(data))
}

pub fn update_response(event: &LifecycleEvent) -> CallbackResponse {
    let data = ResponseData::from([("Message".to_string(), SUCCESS_MESSAGE.to_string())]);
    success_response(event, data)
}

pub fn delete_response(event: &LifecycleEvent) -> CallbackResponse {
    build_response(event, ResponseStatus::Success, DELETE_REASON, None)
}

pub fn failure_response(event: &LifecycleEvent, reason: &str) -> CallbackResponse {
    build_response(event, ResponseStatus::Failed, reason, None)
}

fn build_response(
    event: &LifecycleEvent,
    status: ResponseStatus,
    reason: &str,
    data: Option<ResponseData>,
) -> CallbackResponse {
    CallbackResponse {
        status,
        reason: truncate_reason(reason),
        physical_resource_id: event.service_token.clone(),
        stack_id: event.stack_id.clone(),
        request_id: event.request_id.clone(),
        logical_resource_id: event.logical_resource_id.clone(),
        data,
    }
}

/// CloudFormation rejects response bodies above 4 KiB.
pub fn truncate_reason(reason: &str) -> String {
    if reason.chars().count() <= MAX_REASON_CHARS {
        return reason.to_string();
    }
    let mut truncated: String = reason.chars().take(MAX_REASON_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}
