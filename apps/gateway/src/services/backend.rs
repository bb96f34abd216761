// [apps/gateway/src/services/backend.rs]
/*!
 * Forwarding to the backend tool-execution process (spec §1 - named as
 * an out-of-scope external collaborator, reachable only through this
 * narrow contract: given an admitted `(tool, args)`, return its JSON
 * result or an error string). When no backend URL is configured this
 * degrades to a stub response so the admission pipeline is exercisable
 * standalone.
 */

use crate::config::GatewayConfig;
use paygate_model::JsonValue;
use serde_json::json;

pub async fn forward_to_backend(
    client: &reqwest::Client,
    config: &GatewayConfig,
    tool: &str,
    args: &JsonValue,
) -> Result<JsonValue, String> {
    let Some(url) = &config.backend_url else {
        return Ok(json!({
            "content": [{ "type": "text", "text": format!("tool '{tool}' executed (no backend configured)") }],
        }));
    };

    let body = json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": { "name": tool, "arguments": args } });

    let response = client.post(url).json(&body).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("backend status {}", response.status()));
    }

    let parsed: JsonValue = response.json().await.map_err(|e| e.to_string())?;
    match parsed.get("error") {
        Some(err) => Err(err.to_string()),
        None => Ok(parsed.get("result").cloned().unwrap_or(JsonValue::Null)),
    }
}
