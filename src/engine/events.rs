//! Push-notification listener.
//!
//! The engine announces finished transfers over the WebSocket flavor of its
//! control endpoint. The listener forwards each completed gid into the
//! supervisor's queue; if the channel cannot be opened, completions are
//! still observed through the regular poll cycle, so consumers stay
//! correct either way (they must tolerate duplicate complete signals).

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const COMPLETE_METHOD: &str = "aria2.onDownloadComplete";

#[derive(Debug, Deserialize)]
struct Notification {
    method: String,
    #[serde(default)]
    params: Vec<NotificationParam>,
}

#[derive(Debug, Deserialize)]
struct NotificationParam {
    gid: String,
}

/// Runs until the socket or the receiving side goes away.
pub async fn listen(endpoint: String, completions: mpsc::Sender<String>) {
    let (mut stream, _) = match connect_async(endpoint.as_str()).await {
        Ok(pair) => pair,
        Err(e) => {
            log::warn!("notification channel unavailable ({e}); relying on polling");
            return;
        }
    };
    log::debug!("notification channel open at {endpoint}");

    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        let notification: Notification = match serde_json::from_str(text.as_str()) {
            Ok(notification) => notification,
            Err(_) => continue,
        };
        if notification.method != COMPLETE_METHOD {
            continue;
        }
        for param in notification.params {
            if completions.send(param.gid).await.is_err() {
                return;
            }
        }
    }
    log::debug!("notification channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_notification_decodes() {
        let raw = r#"{"jsonrpc":"2.0","method":"aria2.onDownloadComplete","params":[{"gid":"2089b05ecca3d829"}]}"#;
        let notification: Notification = serde_json::from_str(raw).unwrap();
        assert_eq!(notification.method, COMPLETE_METHOD);
        assert_eq!(notification.params[0].gid, "2089b05ecca3d829");
    }

    #[test]
    fn unrelated_notification_is_distinguishable() {
        let raw = r#"{"jsonrpc":"2.0","method":"aria2.onDownloadStart","params":[{"gid":"aa"}]}"#;
        let notification: Notification = serde_json::from_str(raw).unwrap();
        assert_ne!(notification.method, COMPLETE_METHOD);
    }
}
