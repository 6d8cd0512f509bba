//! State machine for the analyzer's background-indexing handshake.
//!
//! After the initialize handshake the client opens one file from the
//! compilation database, which makes clangd start indexing the project.
//! clangd then asks permission to report progress with a
//! `window/workDoneProgress/create` request and streams `$/progress`
//! notifications until the index is complete. The analyzer is not useful
//! for queries before that point.

use crate::dispatch::{BACKGROUND_INDEX_TOKEN, PROGRESS_METHOD, WORK_DONE_PROGRESS_CREATE};
use crate::error::ClientError;
use crate::transport::{JsonRpcMessage, RequestId};
use lsp_types::{NumberOrString, ProgressParams, ProgressParamsValue, WorkDoneProgress};

/// Phase of the indexing handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    /// Waiting for the analyzer's progress creation request.
    AwaitingCreate,
    /// Consuming progress reports.
    Reporting,
    /// Indexing finished.
    Done,
}

/// What the driving loop must do after feeding one message to the tracker.
#[derive(Debug, PartialEq)]
pub enum IndexStep {
    /// Acknowledge the analyzer's creation request with a null result.
    ///
    /// The analyzer stalls until this reply is sent.
    Acknowledge { id: RequestId },
    /// A progress report was observed; keep waiting.
    Reported { percentage: u32 },
    /// Indexing finished.
    Finished,
}

/// Tracks background-index progress for one connection start.
#[derive(Debug)]
pub struct IndexProgress {
    phase: IndexPhase,
    percentage: u32,
}

impl Default for IndexProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexProgress {
    /// Creates a tracker in the `AwaitingCreate` phase.
    pub fn new() -> Self {
        Self {
            phase: IndexPhase::AwaitingCreate,
            percentage: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> IndexPhase {
        self.phase
    }

    /// Last observed percentage; forced to 100 once indexing ends.
    pub fn percentage(&self) -> u32 {
        self.percentage
    }

    /// Feeds one delivery-queue entry to the state machine.
    ///
    /// An unexpected message while waiting for the creation request is a
    /// protocol violation and fails the whole start sequence.
    pub fn advance(&mut self, message: JsonRpcMessage) -> Result<IndexStep, ClientError> {
        match self.phase {
            IndexPhase::AwaitingCreate => self.on_create(message),
            IndexPhase::Reporting => self.on_progress(message),
            IndexPhase::Done => Err(ClientError::protocol(
                "background indexing already finished",
            )),
        }
    }

    fn on_create(&mut self, message: JsonRpcMessage) -> Result<IndexStep, ClientError> {
        match message {
            JsonRpcMessage::Request(request) if request.method == WORK_DONE_PROGRESS_CREATE => {
                let token = request
                    .params
                    .as_ref()
                    .and_then(|params| params.get("token"))
                    .and_then(|token| token.as_str());
                if token != Some(BACKGROUND_INDEX_TOKEN) {
                    return Err(ClientError::protocol(format!(
                        "unexpected progress token: {:?}",
                        token
                    )));
                }
                self.phase = IndexPhase::Reporting;
                Ok(IndexStep::Acknowledge { id: request.id })
            }
            other => Err(ClientError::protocol(format!(
                "expected {} from the analyzer, got {}",
                WORK_DONE_PROGRESS_CREATE,
                other.describe()
            ))),
        }
    }

    fn on_progress(&mut self, message: JsonRpcMessage) -> Result<IndexStep, ClientError> {
        let notification = match message {
            JsonRpcMessage::Notification(notif) if notif.method == PROGRESS_METHOD => notif,
            other => {
                return Err(ClientError::protocol(format!(
                    "expected {} notification, got {}",
                    PROGRESS_METHOD,
                    other.describe()
                )))
            }
        };

        let params = notification
            .params
            .ok_or_else(|| ClientError::protocol("progress notification without params"))?;
        let progress: ProgressParams = serde_json::from_value(params)
            .map_err(|e| ClientError::protocol(format!("malformed progress params: {}", e)))?;

        // only the background-index token is tracked
        let ours = matches!(&progress.token, NumberOrString::String(token) if token == BACKGROUND_INDEX_TOKEN);
        if !ours {
            return Ok(IndexStep::Reported {
                percentage: self.percentage,
            });
        }

        match progress.value {
            ProgressParamsValue::WorkDone(WorkDoneProgress::Begin(_)) => Ok(IndexStep::Reported {
                percentage: self.percentage,
            }),
            ProgressParamsValue::WorkDone(WorkDoneProgress::Report(report)) => {
                self.percentage = report.percentage.unwrap_or(self.percentage);
                Ok(IndexStep::Reported {
                    percentage: self.percentage,
                })
            }
            ProgressParamsValue::WorkDone(WorkDoneProgress::End(_)) => {
                self.percentage = 100;
                self.phase = IndexPhase::Done;
                Ok(IndexStep::Finished)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{JsonRpcNotification, JsonRpcRequest};
    use serde_json::json;

    fn create_request(token: &str) -> JsonRpcMessage {
        JsonRpcMessage::Request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(1),
            method: WORK_DONE_PROGRESS_CREATE.to_string(),
            params: Some(json!({ "token": token })),
        })
    }

    fn progress_notification(token: &str, value: serde_json::Value) -> JsonRpcMessage {
        JsonRpcMessage::Notification(JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: PROGRESS_METHOD.to_string(),
            params: Some(json!({ "token": token, "value": value })),
        })
    }

    #[test]
    fn test_full_handshake() {
        let mut tracker = IndexProgress::new();
        assert_eq!(tracker.phase(), IndexPhase::AwaitingCreate);

        let step = tracker.advance(create_request(BACKGROUND_INDEX_TOKEN)).unwrap();
        assert_eq!(
            step,
            IndexStep::Acknowledge {
                id: RequestId::Number(1)
            }
        );
        assert_eq!(tracker.phase(), IndexPhase::Reporting);

        let step = tracker
            .advance(progress_notification(
                BACKGROUND_INDEX_TOKEN,
                json!({ "kind": "report", "percentage": 40 }),
            ))
            .unwrap();
        assert_eq!(step, IndexStep::Reported { percentage: 40 });

        let step = tracker
            .advance(progress_notification(
                BACKGROUND_INDEX_TOKEN,
                json!({ "kind": "end" }),
            ))
            .unwrap();
        assert_eq!(step, IndexStep::Finished);
        assert_eq!(tracker.phase(), IndexPhase::Done);
        // percentage is forced to 100 regardless of the last report
        assert_eq!(tracker.percentage(), 100);
    }

    #[test]
    fn test_report_while_awaiting_create_is_fatal() {
        let mut tracker = IndexProgress::new();

        let err = tracker
            .advance(progress_notification(
                BACKGROUND_INDEX_TOKEN,
                json!({ "kind": "report", "percentage": 40 }),
            ))
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol { .. }));
    }

    #[test]
    fn test_wrong_token_create_is_fatal() {
        let mut tracker = IndexProgress::new();

        let err = tracker.advance(create_request("someOtherWork")).unwrap_err();
        assert!(matches!(err, ClientError::Protocol { .. }));
    }

    #[test]
    fn test_begin_keeps_percentage() {
        let mut tracker = IndexProgress::new();
        tracker.advance(create_request(BACKGROUND_INDEX_TOKEN)).unwrap();

        let step = tracker
            .advance(progress_notification(
                BACKGROUND_INDEX_TOKEN,
                json!({ "kind": "begin", "title": "indexing" }),
            ))
            .unwrap();
        assert_eq!(step, IndexStep::Reported { percentage: 0 });
        assert_eq!(tracker.phase(), IndexPhase::Reporting);
    }

    #[test]
    fn test_foreign_token_progress_is_ignored() {
        let mut tracker = IndexProgress::new();
        tracker.advance(create_request(BACKGROUND_INDEX_TOKEN)).unwrap();

        let step = tracker
            .advance(progress_notification(
                "someOtherWork",
                json!({ "kind": "end" }),
            ))
            .unwrap();
        assert_eq!(step, IndexStep::Reported { percentage: 0 });
        assert_eq!(tracker.phase(), IndexPhase::Reporting);
    }
}
