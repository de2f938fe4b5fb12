use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_answer: Option<PollAnswer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<MessageEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caption_entities: Vec<MessageEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<Poll>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

pub const ENTITY_BOT_COMMAND: &str = "bot_command";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: i64,
    pub length: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollAnswer {
    pub poll_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default)]
    pub option_ids: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetUpdates {
    pub offset: i64,
    // 0 leaves the server default in place.
    pub limit: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendMessage {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    pub disable_web_page_preview: bool,
}

impl SendMessage {
    pub fn reply(chat_id: i64, reply_to_message_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            reply_to_message_id: Some(reply_to_message_id),
            disable_web_page_preview: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendPoll {
    pub chat_id: i64,
    pub question: String,
    pub options: Vec<String>,
    pub is_anonymous: bool,
    pub is_closed: bool,
    pub disable_notification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{SendPoll, Update};

    #[test]
    fn update_parses_caption_command_with_document() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 908895179,
            "message": {
                "message_id": 77,
                "chat": { "id": -100123, "type": "supergroup" },
                "caption": "/byFile",
                "caption_entities": [{ "type": "bot_command", "offset": 0, "length": 7 }],
                "document": { "file_id": "BQAC", "file_name": "ubuntu.torrent", "file_size": 1024 }
            }
        }))
        .expect("update should parse");
        let message = update.message.expect("message");
        assert_eq!(message.chat.id, -100123);
        assert_eq!(message.caption_entities[0].kind, "bot_command");
        assert!(message.entities.is_empty());
        assert_eq!(
            message.document.and_then(|doc| doc.file_name).as_deref(),
            Some("ubuntu.torrent")
        );
    }

    #[test]
    fn update_parses_poll_answer_without_message() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 5,
            "poll_answer": { "poll_id": "p-1", "user": { "id": 9, "is_bot": false }, "option_ids": [9] }
        }))
        .expect("update should parse");
        assert!(update.message.is_none());
        assert_eq!(update.poll_answer.map(|answer| answer.option_ids), Some(vec![9]));
    }

    #[test]
    fn send_poll_omits_missing_reply_target() {
        let poll = SendPoll {
            chat_id: 1,
            question: "Page 1 from 1".to_owned(),
            options: vec!["a".to_owned(), "b".to_owned()],
            is_anonymous: false,
            is_closed: false,
            disable_notification: false,
            reply_to_message_id: None,
        };
        let value = serde_json::to_value(&poll).expect("serialize");
        assert!(value.get("reply_to_message_id").is_none());
        assert_eq!(value.get("is_anonymous"), Some(&json!(false)));
    }
}
