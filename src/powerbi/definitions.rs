//! Dataflow Gen2 definitions from the Fabric API, including the Power Query M code.

use crate::powerbi::client::{PowerBiClient, PowerBiError, RawResponse};
use crate::powerbi::lro::{PollSettings, PollState, poll_until};
use base64::{Engine as _, engine::general_purpose};
use reqwest::header::LOCATION;
use reqwest::{Method, StatusCode};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

pub const MASHUP_PATH: &str = "mashup.pq";
pub const QUERY_METADATA_PATH: &str = "queryMetadata.json";
pub const PLATFORM_PATH: &str = ".platform";

const INLINE_BASE64: &str = "InlineBase64";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionResponse {
    pub definition: ItemDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub parts: Vec<DefinitionPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionPart {
    pub path: String,
    pub payload: String,
    pub payload_type: String,
}

#[derive(Debug, Deserialize)]
struct OperationState {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

/// Retrieve the raw (base64) definition of a dataflow.
pub async fn get_dataflow_definition(
    client: &PowerBiClient,
    workspace_id: &str,
    dataflow_id: &str,
    poll: PollSettings,
) -> Result<ItemDefinition, PowerBiError> {
    let url = client.fabric_url(&format!(
        "workspaces/{}/dataflows/{}/getDefinition",
        workspace_id, dataflow_id
    ));

    let response = client
        .send_raw(Method::POST, &url, None::<&String>)
        .await?;

    match response.status {
        StatusCode::OK => Ok(response.json::<DefinitionResponse>()?.definition),
        StatusCode::ACCEPTED => {
            let location = response
                .header(LOCATION.as_str())
                .ok_or(PowerBiError::MissingLocation)?
                .to_string();
            let operation_id = response.header("x-ms-operation-id").unwrap_or("unknown");
            log::info!(
                "Retrieving dataflow definition... (Operation ID: {})",
                operation_id
            );
            wait_for_definition(client, &location, poll).await
        }
        _ => Err(response.into_api_error()),
    }
}

/// Retrieve a dataflow definition with every inline payload decoded.
pub async fn get_decoded_dataflow_definition(
    client: &PowerBiClient,
    workspace_id: &str,
    dataflow_id: &str,
    poll: PollSettings,
) -> Result<DecodedDefinition, PowerBiError> {
    let definition = get_dataflow_definition(client, workspace_id, dataflow_id, poll).await?;
    Ok(decode_definition(&definition))
}

async fn wait_for_definition(
    client: &PowerBiClient,
    location: &str,
    poll: PollSettings,
) -> Result<ItemDefinition, PowerBiError> {
    poll_until(poll, "Definition retrieval", move |_| async move {
        let response = client
            .send_raw(Method::GET, location, None::<&String>)
            .await?;

        match response.status {
            StatusCode::ACCEPTED => Ok(PollState::Pending),
            StatusCode::OK => operation_outcome(client, response).await,
            _ => Err(response.into_api_error()),
        }
    })
    .await
}

/// A 200 from the operation URL is either the definition itself or an operation state.
async fn operation_outcome(
    client: &PowerBiClient,
    response: RawResponse,
) -> Result<PollState<ItemDefinition>, PowerBiError> {
    let body: Value = response.json()?;
    if body.get("definition").is_some() {
        let definition: DefinitionResponse = serde_json::from_value(body)?;
        return Ok(PollState::Done(definition.definition));
    }

    let state: OperationState = serde_json::from_value(body)?;
    match state.status.as_deref() {
        Some("Succeeded") => {
            let result_url = response.header(LOCATION.as_str()).ok_or_else(|| {
                PowerBiError::OperationFailed(
                    "operation succeeded without a result location".to_string(),
                )
            })?;
            let definition: DefinitionResponse = client.get_url(result_url).await?;
            Ok(PollState::Done(definition.definition))
        }
        Some("Failed") => Err(PowerBiError::OperationFailed(
            state
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "definition retrieval failed".to_string()),
        )),
        _ => Ok(PollState::Pending),
    }
}

/// Decoded content of one definition part.
#[derive(Debug, Clone, PartialEq)]
pub enum PartContent {
    Json(Value),
    Text(String),
    /// Left as received: not inline base64, or decoding failed.
    Encoded { payload_type: String, payload: String },
}

impl PartContent {
    pub fn payload_type(&self) -> &str {
        match self {
            PartContent::Json(_) => "DecodedJSON",
            PartContent::Text(_) => "DecodedText",
            PartContent::Encoded { payload_type, .. } => payload_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPart {
    pub path: String,
    pub content: PartContent,
    pub decode_error: Option<String>,
}

impl Serialize for DecodedPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.decode_error.is_some() { 4 } else { 3 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("path", &self.path)?;
        map.serialize_entry("payloadType", self.content.payload_type())?;
        match &self.content {
            PartContent::Json(value) => map.serialize_entry("payload", value)?,
            PartContent::Text(text) => map.serialize_entry("payload", text)?,
            PartContent::Encoded { payload, .. } => map.serialize_entry("payload", payload)?,
        }
        if let Some(error) = &self.decode_error {
            map.serialize_entry("decode_error", error)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub parts: Vec<DecodedPart>,
}

impl DecodedDefinition {
    pub fn part(&self, path: &str) -> Option<&DecodedPart> {
        self.parts.iter().find(|p| p.path == path)
    }

    /// Power Query M code.
    pub fn mashup(&self) -> Option<&str> {
        match &self.part(MASHUP_PATH)?.content {
            PartContent::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn query_metadata(&self) -> Option<&Value> {
        match &self.part(QUERY_METADATA_PATH)?.content {
            PartContent::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn platform(&self) -> Option<&Value> {
        match &self.part(PLATFORM_PATH)?.content {
            PartContent::Json(value) => Some(value),
            _ => None,
        }
    }
}

pub fn decode_definition(definition: &ItemDefinition) -> DecodedDefinition {
    DecodedDefinition {
        format: definition.format.clone(),
        parts: definition.parts.iter().map(decode_part).collect(),
    }
}

/// `.json` and `.platform` parts become JSON, everything else UTF-8 text.
pub fn decode_part(part: &DefinitionPart) -> DecodedPart {
    let encoded = || PartContent::Encoded {
        payload_type: part.payload_type.clone(),
        payload: part.payload.clone(),
    };

    if part.payload_type != INLINE_BASE64 {
        return DecodedPart {
            path: part.path.clone(),
            content: encoded(),
            decode_error: None,
        };
    }

    match decode_payload(&part.path, &part.payload) {
        Ok(content) => DecodedPart {
            path: part.path.clone(),
            content,
            decode_error: None,
        },
        Err(error) => {
            log::warn!("Failed to decode definition part {}: {}", part.path, error);
            DecodedPart {
                path: part.path.clone(),
                content: encoded(),
                decode_error: Some(error),
            }
        }
    }
}

fn decode_payload(path: &str, payload: &str) -> Result<PartContent, String> {
    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| format!("Invalid base64 payload: {}", e))?;
    let text = String::from_utf8(bytes).map_err(|e| format!("Payload is not UTF-8: {}", e))?;

    if path.ends_with(".json") || path == PLATFORM_PATH {
        serde_json::from_str(&text)
            .map(PartContent::Json)
            .map_err(|e| format!("Invalid JSON payload: {}", e))
    } else {
        Ok(PartContent::Text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inline(path: &str, content: &str) -> DefinitionPart {
        DefinitionPart {
            path: path.to_string(),
            payload: general_purpose::STANDARD.encode(content),
            payload_type: INLINE_BASE64.to_string(),
        }
    }

    #[test]
    fn decodes_mashup_metadata_and_platform() {
        let definition = ItemDefinition {
            format: None,
            parts: vec![
                inline(QUERY_METADATA_PATH, r#"{"formatVersion":"202502"}"#),
                inline(MASHUP_PATH, "section Section1;\nshared Orders = 1;"),
                inline(PLATFORM_PATH, r#"{"metadata":{"type":"Dataflow"}}"#),
            ],
        };

        let decoded = decode_definition(&definition);
        assert_eq!(
            decoded.mashup(),
            Some("section Section1;\nshared Orders = 1;")
        );
        assert_eq!(
            decoded.query_metadata(),
            Some(&json!({"formatVersion": "202502"}))
        );
        assert_eq!(decoded.platform().unwrap()["metadata"]["type"], "Dataflow");
    }

    #[test]
    fn invalid_base64_keeps_original_payload() {
        let part = DefinitionPart {
            path: MASHUP_PATH.to_string(),
            payload: "not base64!!".to_string(),
            payload_type: INLINE_BASE64.to_string(),
        };
        let decoded = decode_part(&part);
        assert!(decoded.decode_error.is_some());
        assert_eq!(
            decoded.content,
            PartContent::Encoded {
                payload_type: INLINE_BASE64.to_string(),
                payload: "not base64!!".to_string(),
            }
        );
    }

    #[test]
    fn invalid_json_is_reported() {
        let decoded = decode_part(&inline(QUERY_METADATA_PATH, "{broken"));
        assert!(
            decoded
                .decode_error
                .as_deref()
                .unwrap()
                .starts_with("Invalid JSON payload")
        );
    }

    #[test]
    fn non_inline_parts_are_untouched() {
        let part = DefinitionPart {
            path: "x.bin".to_string(),
            payload: "abc".to_string(),
            payload_type: "Other".to_string(),
        };
        let decoded = decode_part(&part);
        assert_eq!(decoded.decode_error, None);
        assert_eq!(decoded.content.payload_type(), "Other");
    }

    #[test]
    fn decoded_part_serializes_with_payload_type() {
        let decoded = decode_part(&inline(MASHUP_PATH, "let x = 1 in x"));
        assert_eq!(
            serde_json::to_value(&decoded).unwrap(),
            json!({"path": "mashup.pq", "payloadType": "DecodedText", "payload": "let x = 1 in x"})
        );

        let decoded = decode_part(&inline(QUERY_METADATA_PATH, r#"{"a":1}"#));
        assert_eq!(
            serde_json::to_value(&decoded).unwrap(),
            json!({"path": "queryMetadata.json", "payloadType": "DecodedJSON", "payload": {"a": 1}})
        );
    }
}
