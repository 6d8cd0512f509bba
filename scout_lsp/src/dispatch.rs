//! Classifies inbound analyzer messages and decides their fate.
//!
//! The read task feeds every framed payload through here. Replies are
//! matched against the pending ledger; the only analyzer-initiated request
//! the client honors is the background-index progress creation; progress
//! notifications are always forwarded because a progress consumer is
//! normally blocked waiting for them. Everything else is dropped with a
//! diagnostic log entry.

use crate::pending::PendingLedger;
use crate::transport::{parse_message, JsonRpcMessage, RequestId};

/// Progress token clangd uses for project-wide background indexing.
pub const BACKGROUND_INDEX_TOKEN: &str = "backgroundIndexProgress";

/// Method of the analyzer-initiated progress creation request.
pub const WORK_DONE_PROGRESS_CREATE: &str = "window/workDoneProgress/create";

/// Method of progress notifications.
pub const PROGRESS_METHOD: &str = "$/progress";

/// Routing decision for one inbound payload.
#[derive(Debug)]
pub enum Route {
    /// Forward to the delivery queue for a waiting caller.
    Deliver(JsonRpcMessage),
    /// Discard.
    Drop,
}

/// Parses a raw payload and routes it against the pending ledger.
pub fn route_payload(payload: &str, ledger: &mut PendingLedger) -> Route {
    match parse_message(payload) {
        Some(message) => route_message(message, ledger),
        None => {
            log::debug!("dropping unparseable payload: {}", payload);
            Route::Drop
        }
    }
}

/// Routes an already parsed message against the pending ledger.
pub fn route_message(message: JsonRpcMessage, ledger: &mut PendingLedger) -> Route {
    match message {
        JsonRpcMessage::Response(response) => {
            let RequestId::Number(id) = response.id else {
                log::warn!("dropping reply with non-numeric id: {:?}", response.id);
                return Route::Drop;
            };
            match ledger.complete(id) {
                Some(entry) => {
                    log::debug!("received reply for {}({})", entry.method, entry.id);
                    Route::Deliver(JsonRpcMessage::Response(response))
                }
                None => {
                    log::warn!("dropping reply with no matching request: {}", id);
                    Route::Drop
                }
            }
        }
        JsonRpcMessage::Request(request) => {
            let token = request
                .params
                .as_ref()
                .and_then(|params| params.get("token"))
                .and_then(|token| token.as_str());
            if request.method == WORK_DONE_PROGRESS_CREATE && token == Some(BACKGROUND_INDEX_TOKEN)
            {
                log::info!("received {} request", WORK_DONE_PROGRESS_CREATE);
                Route::Deliver(JsonRpcMessage::Request(request))
            } else {
                log::warn!("dropping unexpected analyzer request: {}", request.method);
                Route::Drop
            }
        }
        JsonRpcMessage::Notification(notification) => {
            if notification.method == PROGRESS_METHOD {
                Route::Deliver(JsonRpcMessage::Notification(notification))
            } else {
                log::debug!("dropping unhandled notification: {}", notification.method);
                Route::Drop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deliver(route: Route) -> JsonRpcMessage {
        match route {
            Route::Deliver(message) => message,
            Route::Drop => panic!("expected delivery, got drop"),
        }
    }

    fn assert_dropped(route: Route) {
        assert!(matches!(route, Route::Drop));
    }

    #[test]
    fn test_reply_matches_pending_request() {
        let mut ledger = PendingLedger::new();
        ledger.insert(11, "initialize");

        let route = route_payload(r#"{"jsonrpc":"2.0","id":11,"result":{}}"#, &mut ledger);
        match deliver(route) {
            JsonRpcMessage::Response(resp) => assert_eq!(resp.id, RequestId::Number(11)),
            other => panic!("expected response, got {:?}", other),
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_reply_without_pending_request_is_dropped() {
        let mut ledger = PendingLedger::new();

        let route = route_payload(r#"{"jsonrpc":"2.0","id":42,"result":null}"#, &mut ledger);
        assert_dropped(route);
    }

    #[test]
    fn test_background_index_create_is_delivered() {
        let mut ledger = PendingLedger::new();

        let route = route_payload(
            r#"{"jsonrpc":"2.0","id":1,"method":"window/workDoneProgress/create","params":{"token":"backgroundIndexProgress"}}"#,
            &mut ledger,
        );
        match deliver(route) {
            JsonRpcMessage::Request(req) => assert_eq!(req.method, WORK_DONE_PROGRESS_CREATE),
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_foreign_server_request_is_dropped() {
        let mut ledger = PendingLedger::new();

        assert_dropped(route_payload(
            r#"{"jsonrpc":"2.0","id":1,"method":"workspace/configuration","params":{}}"#,
            &mut ledger,
        ));
        // right method, wrong token
        assert_dropped(route_payload(
            r#"{"jsonrpc":"2.0","id":1,"method":"window/workDoneProgress/create","params":{"token":"somethingElse"}}"#,
            &mut ledger,
        ));
    }

    #[test]
    fn test_progress_notification_is_delivered() {
        let mut ledger = PendingLedger::new();

        let route = route_payload(
            r#"{"jsonrpc":"2.0","method":"$/progress","params":{"token":"backgroundIndexProgress","value":{"kind":"report","percentage":40}}}"#,
            &mut ledger,
        );
        match deliver(route) {
            JsonRpcMessage::Notification(notif) => assert_eq!(notif.method, PROGRESS_METHOD),
            other => panic!("expected notification, got {:?}", other),
        }
    }

    #[test]
    fn test_other_notifications_are_dropped() {
        let mut ledger = PendingLedger::new();

        assert_dropped(route_payload(
            r#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{}}"#,
            &mut ledger,
        ));
    }

    #[test]
    fn test_degenerate_payload_is_dropped() {
        let mut ledger = PendingLedger::new();

        // framed `{}` has neither id nor method
        assert_dropped(route_payload("{}", &mut ledger));
        assert_dropped(route_payload("", &mut ledger));
    }
}
