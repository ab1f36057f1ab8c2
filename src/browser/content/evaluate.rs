//! Script evaluation against the page
//!
//! The evaluate command runs a caller-supplied JavaScript function in a
//! dedicated QuickJS context, outside any isolation the host process might
//! apply to page content. The user expression is wrapped in an async
//! immediately-invoked function; the optional target element is exposed to
//! the function as a tagged plain object; the outcome travels back through
//! a well-known global that the wrapper fills in.
//!
//! Output serialization rules:
//!
//! - element objects come back as `"[DOM Node: <TAG>]"`;
//! - JSON-serializable values up to 1 MiB pass through;
//! - oversized serializations are replaced by a placeholder naming the
//!   size;
//! - unserializable values are stringified, or `"[Unserializable result]"`
//!   when even that fails.
//!
//! Execution is bounded by an interrupt-handler deadline (30 s by
//! default) plus memory and stack limits on the runtime.

use std::time::{Duration, Instant};

use ego_tree::NodeId;
use rquickjs::{CatchResultExt, CaughtError, Context, Runtime};
use serde_json::{json, Value};

use crate::browser::content::page::{visible_text, Page};
use crate::browser::content::refs::RefMap;
use crate::error::AgentfoxError;
use crate::protocol::EvaluateParams;

/// Default wall-clock budget for one evaluation.
pub const EVALUATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Serialized results above this size are replaced by a placeholder.
pub const MAX_RESULT_BYTES: usize = 1024 * 1024;

/// Memory ceiling for the evaluation runtime.
const JS_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Stack ceiling for the evaluation runtime.
const JS_STACK_LIMIT: usize = 512 * 1024;

/// In-script serializer: elements become DOM-node markers, everything else
/// goes through JSON with stringification fallbacks.
const SERIALIZE_HELPER: &str = r#"
const __agentfoxSerialize = (v) => {
    if (v === undefined) { return "null"; }
    if (v !== null && typeof v === "object" && typeof v.__agentfoxNode === "string") {
        return JSON.stringify("[DOM Node: " + v.__agentfoxNode + "]");
    }
    try {
        const s = JSON.stringify(v);
        if (s === undefined) { return JSON.stringify(String(v)); }
        return s;
    } catch (_e) {
        try { return JSON.stringify(String(v)); }
        catch (_e2) { return JSON.stringify("[Unserializable result]"); }
    }
};
"#;

/// Evaluate a function expression against the page.
///
/// # Errors
///
/// [`AgentfoxError::Evaluate`] for a non-function expression, an exception
/// thrown inside the script, a promise that never settles, or the deadline
/// expiring. Reference failures surface as the usual unknown/stale errors.
pub fn evaluate(
    page: &Page,
    refs: &mut RefMap,
    params: &EvaluateParams,
    timeout: Duration,
) -> Result<Value, AgentfoxError> {
    let target = match &params.element_ref {
        Some(label) => {
            let id = refs.resolve(page, label)?;
            element_stub(page, id)
        }
        None => Value::Null,
    };
    run_script(&params.function, &target, timeout)
}

/// A plain-object stand-in for the target element, tagged so the
/// serializer can recognize it.
fn element_stub(page: &Page, id: NodeId) -> Value {
    let Some(el) = page.element(id) else {
        return Value::Null;
    };
    let tag = el.value().name().to_uppercase();
    let mut attributes = serde_json::Map::new();
    for (name, value) in el.value().attrs() {
        attributes.insert(name.to_string(), Value::String(value.to_string()));
    }
    json!({
        "__agentfoxNode": tag,
        "tagName": tag,
        "id": el.value().id().unwrap_or(""),
        "attributes": attributes,
        "textContent": visible_text(el),
        "value": page.value_of(id),
    })
}

fn run_script(
    function: &str,
    target: &Value,
    timeout: Duration,
) -> Result<Value, AgentfoxError> {
    let runtime =
        Runtime::new().map_err(|e| AgentfoxError::Evaluate(format!("runtime setup: {}", e)))?;
    runtime.set_memory_limit(JS_MEMORY_LIMIT);
    runtime.set_max_stack_size(JS_STACK_LIMIT);

    let deadline = Instant::now() + timeout;
    runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));

    let context =
        Context::full(&runtime).map_err(|e| AgentfoxError::Evaluate(format!("context: {}", e)))?;

    let target_literal = serde_json::to_string(target)
        .map_err(|e| AgentfoxError::Evaluate(format!("target serialization: {}", e)))?;
    let script = format!(
        r#"{serialize}
const __agentfoxTarget = {target};
globalThis.__agentfoxOutcome = undefined;
(async () => {{
    try {{
        const __fn = ({function});
        if (typeof __fn !== "function") {{
            throw new TypeError("Evaluate expression must be a function");
        }}
        const __value = await __fn(__agentfoxTarget);
        globalThis.__agentfoxOutcome = {{ ok: true, value: __agentfoxSerialize(__value) }};
    }} catch (e) {{
        globalThis.__agentfoxOutcome = {{
            ok: false,
            error: (e && e.message !== undefined) ? String(e.message) : String(e)
        }};
    }}
}})();
"#,
        serialize = SERIALIZE_HELPER,
        target = target_literal,
        function = function,
    );

    let eval_result: Result<(), String> = context.with(|ctx| {
        match ctx.eval::<rquickjs::Value, _>(script.as_bytes()).catch(&ctx) {
            Ok(_) => Ok(()),
            Err(e) => Err(caught_message(e)),
        }
    });
    if let Err(message) = eval_result {
        if Instant::now() >= deadline {
            return Err(timeout_error(timeout));
        }
        return Err(AgentfoxError::Evaluate(message));
    }

    // Drain pending jobs so the async wrapper can settle.
    loop {
        if Instant::now() >= deadline {
            return Err(timeout_error(timeout));
        }
        match runtime.execute_pending_job() {
            Ok(true) => continue,
            Ok(false) => break,
            Err(e) => {
                tracing::warn!("pending job failed: {:?}", e);
                break;
            }
        }
    }

    let outcome_json: String = context.with(|ctx| {
        ctx.eval::<String, _>(
            "JSON.stringify(globalThis.__agentfoxOutcome === undefined ? null : globalThis.__agentfoxOutcome)"
                .as_bytes(),
        )
        .catch(&ctx)
        .map_err(|e| AgentfoxError::Evaluate(format!("outcome read: {}", caught_message(e))))
    })?;

    let outcome: Value = serde_json::from_str(&outcome_json)
        .map_err(|e| AgentfoxError::Evaluate(format!("outcome parse: {}", e)))?;
    if outcome.is_null() {
        return Err(AgentfoxError::Evaluate(
            "script did not settle (a pending promise never resolved)".to_string(),
        ));
    }
    if outcome["ok"] != json!(true) {
        let message = outcome["error"].as_str().unwrap_or("unknown error");
        return Err(AgentfoxError::Evaluate(message.to_string()));
    }

    let serialized = outcome["value"].as_str().unwrap_or("null");
    if serialized.len() > MAX_RESULT_BYTES {
        return Ok(Value::String(format!(
            "[Result truncated: serialized size {} bytes exceeds 1MB limit]",
            serialized.len()
        )));
    }
    serde_json::from_str(serialized)
        .map_err(|e| AgentfoxError::Evaluate(format!("result parse: {}", e)))
}

/// Render a caught JS error as a plain message string.
fn caught_message(error: CaughtError<'_>) -> String {
    match error {
        CaughtError::Exception(ex) => format!("{}", ex),
        CaughtError::Value(v) => {
            let s: Result<String, _> = v.get();
            s.unwrap_or_else(|_| "unknown error".to_string())
        }
        CaughtError::Error(e) => e.to_string(),
    }
}

fn timeout_error(timeout: Duration) -> AgentfoxError {
    AgentfoxError::Evaluate(format!(
        "Evaluation timed out after {}s",
        timeout.as_secs_f64()
    ))
}
