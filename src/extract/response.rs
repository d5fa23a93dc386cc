use crate::error::PipelineError;
use crate::pipeline::llm::ChatCompletion;
use crate::pipeline::postprocess::clean_json_response;
use serde_json::Value;
use tracing::{debug, error, warn};

/// Shared handling of a chat answer for every strategy.
///
/// * service error → logged and returned;
/// * zero choices or an empty first choice → logged, `Ok(None)`;
/// * text that is not JSON → [`PipelineError::MalformedOutput`];
/// * a JSON `null` → `Ok(None)`.
pub fn interpret_completion(
    strategy: &str,
    completion: Result<ChatCompletion, PipelineError>,
) -> Result<Option<Value>, PipelineError> {
    let completion = match completion {
        Ok(c) => c,
        Err(e) => {
            error!("{}: failed to extract data from the document. {}", strategy, e);
            return Err(e);
        }
    };

    debug!(
        "{}: {} input tokens, {} output tokens",
        strategy, completion.input_tokens, completion.output_tokens
    );

    let Some(choice) = completion.choices.into_iter().next() else {
        warn!("{}: no data was returned from the chat service.", strategy);
        return Ok(None);
    };

    let text = clean_json_response(&choice.text);
    if text.is_empty() {
        warn!("{}: no data was extracted from the document.", strategy);
        return Ok(None);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Null) => {
            warn!("{}: model answered null.", strategy);
            Ok(None)
        }
        Ok(value) => Ok(Some(value)),
        Err(source) => {
            error!("{}: model output is not JSON: {}", strategy, source);
            Err(PipelineError::MalformedOutput { source })
        }
    }
}
