// [libs/core/tasks/src/dispatch.rs]
/*!
 * `handleTasksMethod` (spec §4.6): implements `tasks/{send,get,result,
 * list,cancel}` and wraps every response in the
 * `{content:[{type:"text",text:JSON}]}` envelope the MCP dialect expects.
 */

use crate::errors::TaskError;
use crate::manager::TaskManager;
use paygate_model::JsonValue;
use serde_json::json;

pub fn handle_tasks_method(
    manager: &TaskManager,
    method: &str,
    params: &JsonValue,
    api_key_prefix: &str,
    session_id: Option<String>,
) -> Result<JsonValue, TaskError> {
    let payload = match method {
        "tasks/send" => {
            let tool_name = params.get("tool").and_then(|v| v.as_str()).ok_or_else(|| TaskError::MalformedParams("missing `tool`".into()))?;
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            let task = manager.create(tool_name, arguments, api_key_prefix, session_id);
            json!({ "taskId": task.id, "status": task.status })
        }
        "tasks/get" => {
            let id = require_id(params)?;
            let task = manager.get(&id).ok_or(TaskError::NotFound)?;
            serde_json::to_value(task).unwrap_or(JsonValue::Null)
        }
        "tasks/result" => {
            let id = require_id(params)?;
            let task = manager.get(&id).ok_or(TaskError::NotFound)?;
            json!({ "status": task.status, "result": task.result, "error": task.error })
        }
        "tasks/list" => {
            let cursor = params.get("cursor").and_then(|v| v.as_str()).and_then(|s| s.parse::<usize>().ok()).unwrap_or(0);
            let page_size = params.get("pageSize").and_then(|v| v.as_u64()).unwrap_or(50) as usize;
            let (tasks, next_cursor) = manager.list(cursor, page_size);
            json!({
                "tasks": tasks,
                "nextCursor": next_cursor.map(|c| c.to_string()),
            })
        }
        "tasks/cancel" => {
            let id = require_id(params)?;
            let task = manager.cancel(&id)?;
            json!({ "taskId": task.id, "status": task.status })
        }
        other => return Err(TaskError::UnknownMethod(other.to_string())),
    };

    Ok(envelope(payload))
}

fn require_id(params: &JsonValue) -> Result<String, TaskError> {
    params
        .get("taskId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| TaskError::MalformedParams("missing `taskId`".into()))
}

fn envelope(payload: JsonValue) -> JsonValue {
    json!({
        "content": [
            { "type": "text", "text": payload.to_string() }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{DEFAULT_MAX_TASKS, DEFAULT_TASK_TIMEOUT};

    #[test]
    fn send_then_get_round_trips_through_envelope() {
        let manager = TaskManager::new(DEFAULT_MAX_TASKS, DEFAULT_TASK_TIMEOUT);
        let sent = handle_tasks_method(&manager, "tasks/send", &json!({"tool": "search", "arguments": {}}), "pg_abc", None).unwrap();
        let text = sent["content"][0]["text"].as_str().unwrap();
        let parsed: JsonValue = serde_json::from_str(text).unwrap();
        let task_id = parsed["taskId"].as_str().unwrap().to_string();

        let got = handle_tasks_method(&manager, "tasks/get", &json!({"taskId": task_id}), "pg_abc", None).unwrap();
        assert!(got["content"][0]["text"].as_str().unwrap().contains("pending"));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let manager = TaskManager::new(DEFAULT_MAX_TASKS, DEFAULT_TASK_TIMEOUT);
        assert!(matches!(handle_tasks_method(&manager, "tasks/bogus", &json!({}), "pg_abc", None), Err(TaskError::UnknownMethod(_))));
    }
}
