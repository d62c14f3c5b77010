//! Multi-round accumulation of long fenced outputs.

use anyhow::Result;
use tracing::{debug, warn};

use crate::core::fence::{
    is_complete, sanitize, split_continuation_marker, strip_opening_fence, strip_trailing_fence,
};
use crate::io::model::{LanguageModel, ModelRequest, Turn};
use crate::io::session::{SessionKey, SessionStore};

/// Follow-up question sent after an incomplete chunk.
pub const CONTINUE_PROMPT: &str = "continue";

/// Call the model until the fenced block is closed, then return its body.
///
/// The session for `key` is cleared before the first call and after the last
/// one, so no history leaks between sequences. When `max_rounds` follow-ups
/// run out the accumulated text is returned as is.
pub fn accumulate_continuations<M: LanguageModel + ?Sized>(
    model: &M,
    sessions: &mut SessionStore,
    key: &SessionKey,
    system: &str,
    max_rounds: u32,
) -> Result<String> {
    sessions.clear(key);
    let result = run_rounds(model, sessions, key, system, max_rounds);
    sessions.clear(key);
    result
}

fn run_rounds<M: LanguageModel + ?Sized>(
    model: &M,
    sessions: &mut SessionStore,
    key: &SessionKey,
    system: &str,
    max_rounds: u32,
) -> Result<String> {
    let mut accumulated = String::new();
    let mut question = String::new();
    let mut round = 0u32;

    loop {
        let request = ModelRequest {
            stage: key.stage.clone(),
            system: system.to_string(),
            history: sessions.history(key).to_vec(),
            question: question.clone(),
        };
        let chunk = model.complete(&request)?;
        sessions.append(key, Turn::user(question.as_str()));
        sessions.append(key, Turn::assistant(chunk.as_str()));

        let (body, more) = split_continuation_marker(&chunk);
        let mut body = strip_opening_fence(body);
        if more {
            body = strip_trailing_fence(body);
        }
        accumulated.push_str(body);
        debug!(round, bytes = chunk.len(), more, file = %key.filename, "received chunk");

        if is_complete(&accumulated, more) {
            break;
        }
        if round >= max_rounds {
            warn!(
                file = %key.filename,
                rounds = round,
                "output still incomplete after continuation limit"
            );
            break;
        }
        round += 1;
        question = CONTINUE_PROMPT.to_string();
    }

    Ok(sanitize(&accumulated))
}
