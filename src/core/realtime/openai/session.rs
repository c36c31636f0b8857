//! Session control operations.
//!
//! Each call validates its arguments, enqueues exactly one event and returns
//! that event's id without waiting for the server. Acknowledgments arrive
//! later as ordinary inbound events (`session.updated`,
//! `conversation.item.truncated`, `error` with a matching `event_id`, ...).

use super::client::OpenAIRealtime;
use super::config::OpenAIRealtimeVoice;
use super::messages::{ClientEvent, ConversationItem, ResponseConfig, SessionConfig};
use crate::core::realtime::base::{RealtimeError, RealtimeResult};

fn require_id(name: &str, value: &str) -> RealtimeResult<()> {
    if value.trim().is_empty() {
        return Err(RealtimeError::InvalidArgument(format!(
            "{name} must not be empty"
        )));
    }
    Ok(())
}

fn non_negative(name: &str, value: i64) -> RealtimeResult<u32> {
    if value < 0 {
        return Err(RealtimeError::InvalidArgument(format!(
            "{name} must not be negative, got {value}"
        )));
    }
    u32::try_from(value)
        .map_err(|_| RealtimeError::InvalidArgument(format!("{name} is out of range: {value}")))
}

impl OpenAIRealtime {
    fn send_control(&self, event: ClientEvent) -> RealtimeResult<String> {
        self.ensure_open()?;
        Ok(self.enqueue(event))
    }

    /// Replace the system instructions for the rest of the session.
    pub fn update_instructions(&self, instructions: &str) -> RealtimeResult<String> {
        self.send_control(ClientEvent::SessionUpdate {
            session: SessionConfig {
                instructions: Some(instructions.to_string()),
                ..Default::default()
            },
        })
    }

    /// Switch the output voice. The server rejects this once audio was produced.
    pub fn update_voice(&self, voice: OpenAIRealtimeVoice) -> RealtimeResult<String> {
        self.send_control(ClientEvent::SessionUpdate {
            session: SessionConfig {
                voice: Some(voice.as_str().to_string()),
                ..Default::default()
            },
        })
    }

    /// Ask the server to generate a response, optionally with overrides.
    pub fn create_response(&self, response: Option<ResponseConfig>) -> RealtimeResult<String> {
        self.send_control(ClientEvent::ResponseCreate { response })
    }

    /// Cancel the in-progress response, or the one with `response_id`.
    pub fn cancel_response(&self, response_id: Option<&str>) -> RealtimeResult<String> {
        if let Some(id) = response_id {
            require_id("response_id", id)?;
        }
        self.send_control(ClientEvent::ResponseCancel {
            response_id: response_id.map(str::to_string),
        })
    }

    /// Add `item` to the conversation, after `previous_item_id` if given.
    pub fn create_conversation_item(
        &self,
        item: ConversationItem,
        previous_item_id: Option<&str>,
    ) -> RealtimeResult<String> {
        if item.item_type.trim().is_empty() {
            return Err(RealtimeError::InvalidArgument(
                "conversation item type must not be empty".to_string(),
            ));
        }
        if let Some(id) = previous_item_id {
            require_id("previous_item_id", id)?;
        }
        self.send_control(ClientEvent::ConversationItemCreate {
            item,
            previous_item_id: previous_item_id.map(str::to_string),
        })
    }

    pub fn retrieve_conversation_item(&self, item_id: &str) -> RealtimeResult<String> {
        require_id("item_id", item_id)?;
        self.send_control(ClientEvent::ConversationItemRetrieve {
            item_id: item_id.to_string(),
        })
    }

    /// Cut an assistant audio item at `audio_end_ms`.
    pub fn truncate_conversation_item(
        &self,
        item_id: &str,
        content_index: i64,
        audio_end_ms: i64,
    ) -> RealtimeResult<String> {
        require_id("item_id", item_id)?;
        let content_index = non_negative("content_index", content_index)?;
        let audio_end_ms = non_negative("audio_end_ms", audio_end_ms)?;
        self.send_control(ClientEvent::ConversationItemTruncate {
            item_id: item_id.to_string(),
            content_index,
            audio_end_ms,
        })
    }

    pub fn delete_conversation_item(&self, item_id: &str) -> RealtimeResult<String> {
        require_id("item_id", item_id)?;
        self.send_control(ClientEvent::ConversationItemDelete {
            item_id: item_id.to_string(),
        })
    }

    /// Clear the input buffer. Same as [`OpenAIRealtime::clear_buffer`] but
    /// returns the event id.
    pub fn clear_input_audio_buffer(&self) -> RealtimeResult<String> {
        self.ensure_open()?;
        let mut event_id = String::new();
        self.accumulator().clear_with(|| {
            event_id = self.enqueue(ClientEvent::InputAudioBufferClear);
        });
        Ok(event_id)
    }

    /// Stop playback of audio the server has not streamed yet.
    pub fn clear_output_audio_buffer(&self) -> RealtimeResult<String> {
        self.send_control(ClientEvent::OutputAudioBufferClear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::openai::client::tests::{next_frame, open_client};
    use crate::core::realtime::openai::config::OpenAIRealtimeConfig;
    use tokio_test::{assert_err, assert_ok};

    fn config() -> OpenAIRealtimeConfig {
        OpenAIRealtimeConfig::new("test-key")
    }

    #[tokio::test]
    async fn test_update_instructions_is_partial() {
        let (client, mut rx, _) = open_client(config()).await;
        let event_id = client.update_instructions("Be brief.").unwrap();

        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["type"], "session.update");
        assert_eq!(frame["event_id"], event_id.as_str());
        assert_eq!(frame["session"]["instructions"], "Be brief.");
        assert!(frame["session"].get("voice").is_none());
    }

    #[tokio::test]
    async fn test_update_voice() {
        let (client, mut rx, _) = open_client(config()).await;
        client.update_voice(OpenAIRealtimeVoice::Marin).unwrap();
        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["session"]["voice"], "marin");
    }

    #[tokio::test]
    async fn test_response_lifecycle() {
        let (client, mut rx, _) = open_client(config()).await;
        assert_ok!(client.create_response(None));
        assert_ok!(client.cancel_response(Some("resp_1")));
        assert_ok!(client.cancel_response(None));

        let create = next_frame(&mut rx).await;
        assert_eq!(create["type"], "response.create");
        assert!(create.get("response").is_none());
        let cancel = next_frame(&mut rx).await;
        assert_eq!(cancel["type"], "response.cancel");
        assert_eq!(cancel["response_id"], "resp_1");
        let cancel = next_frame(&mut rx).await;
        assert!(cancel.get("response_id").is_none());
    }

    #[tokio::test]
    async fn test_conversation_item_operations() {
        let (client, mut rx, _) = open_client(config()).await;
        client
            .create_conversation_item(ConversationItem::function_output("call_1", "{}"), None)
            .unwrap();
        client.retrieve_conversation_item("item_1").unwrap();
        client.truncate_conversation_item("item_1", 0, 1500).unwrap();
        client.delete_conversation_item("item_1").unwrap();

        let create = next_frame(&mut rx).await;
        assert_eq!(create["item"]["type"], "function_call_output");
        assert_eq!(create["item"]["call_id"], "call_1");
        assert_eq!(next_frame(&mut rx).await["type"], "conversation.item.retrieve");
        let truncate = next_frame(&mut rx).await;
        assert_eq!(truncate["type"], "conversation.item.truncate");
        assert_eq!(truncate["audio_end_ms"], 1500);
        assert_eq!(truncate["content_index"], 0);
        let delete = next_frame(&mut rx).await;
        assert_eq!(delete["type"], "conversation.item.delete");
        assert_eq!(delete["item_id"], "item_1");
    }

    #[tokio::test]
    async fn test_invalid_arguments_enqueue_nothing() {
        let (client, _rx, _) = open_client(config()).await;

        for result in [
            client.retrieve_conversation_item(""),
            client.delete_conversation_item("  "),
            client.truncate_conversation_item("", 0, 0),
            client.truncate_conversation_item("item_1", -1, 0),
            client.truncate_conversation_item("item_1", 0, -5),
            client.truncate_conversation_item("item_1", 0, i64::MAX),
            client.cancel_response(Some("")),
            client.create_conversation_item(ConversationItem::default(), None),
        ] {
            assert!(matches!(result, Err(RealtimeError::InvalidArgument(_))));
        }
        assert_eq!(client.pending_events(), 0);
    }

    #[tokio::test]
    async fn test_requires_open_connection() {
        let client = OpenAIRealtime::new(config()).unwrap();
        assert!(matches!(
            client.create_response(None),
            Err(RealtimeError::NotConnected)
        ));
        assert_err!(client.clear_output_audio_buffer());
        assert_eq!(client.pending_events(), 0);
    }

    #[tokio::test]
    async fn test_clear_buffers() {
        let (client, mut rx, _) = open_client(config()).await;
        client.append_audio(&[0u8; 4800]).unwrap();
        client.clear_input_audio_buffer().unwrap();
        client.clear_output_audio_buffer().unwrap();
        assert_eq!(client.current_audio_duration_ms(), 0);

        assert_eq!(next_frame(&mut rx).await["type"], "input_audio_buffer.append");
        assert_eq!(next_frame(&mut rx).await["type"], "input_audio_buffer.clear");
        assert_eq!(next_frame(&mut rx).await["type"], "output_audio_buffer.clear");
    }
}
