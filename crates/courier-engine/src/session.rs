// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One bounded conversation with a vending bot.

use std::collections::VecDeque;
use std::time::Duration;

use courier_core::{Conversation, CourierError, MessagingPlatform, ResponseNode};
use tracing::debug;

/// A single exchange recorded in the session history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    Sent { message_id: i64, text: String },
    Clicked { message_id: i64, payload: Vec<u8> },
    Received(ResponseNode),
}

/// Wraps a platform [`Conversation`] with a response timeout and a bounded
/// turn history. Owned by one link run and closed when the run ends.
pub struct ConversationSession {
    conversation: Box<dyn Conversation>,
    history: VecDeque<Turn>,
    history_limit: usize,
    response_timeout: Duration,
    first_command_id: Option<i64>,
}

impl ConversationSession {
    pub async fn open(
        platform: &dyn MessagingPlatform,
        bot: &str,
        response_timeout: Duration,
        history_limit: usize,
    ) -> Result<Self, CourierError> {
        let conversation = platform.open_conversation(bot).await?;
        debug!(bot, "conversation opened");
        Ok(Self {
            conversation,
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
            response_timeout,
            first_command_id: None,
        })
    }

    pub fn bot(&self) -> &str {
        self.conversation.bot()
    }

    /// Id of the first command sent in this session.
    pub fn first_command_id(&self) -> Option<i64> {
        self.first_command_id
    }

    pub fn history(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter()
    }

    pub async fn send(&mut self, text: &str) -> Result<i64, CourierError> {
        let message_id = self.conversation.send_command(text).await?;
        self.first_command_id.get_or_insert(message_id);
        self.record(Turn::Sent {
            message_id,
            text: text.to_string(),
        });
        Ok(message_id)
    }

    /// Next bot message, bounded by the response timeout.
    pub async fn await_response(&mut self) -> Result<ResponseNode, CourierError> {
        let timeout = self.response_timeout;
        let node = tokio::time::timeout(timeout, self.conversation.await_response(timeout))
            .await
            .map_err(|_| CourierError::Timeout { duration: timeout })??;
        self.record(Turn::Received(node.clone()));
        Ok(node)
    }

    /// Press a payload button and wait for what it produces.
    pub async fn click(
        &mut self,
        node: &ResponseNode,
        payload: &[u8],
    ) -> Result<ResponseNode, CourierError> {
        let timeout = self.response_timeout;
        self.record(Turn::Clicked {
            message_id: node.id,
            payload: payload.to_vec(),
        });
        let response =
            tokio::time::timeout(timeout, self.conversation.click_button(node, payload, timeout))
                .await
                .map_err(|_| CourierError::Timeout { duration: timeout })??;
        self.record(Turn::Received(response.clone()));
        Ok(response)
    }

    pub async fn close(mut self) -> Result<(), CourierError> {
        debug!(bot = self.bot(), turns = self.history.len(), "conversation closed");
        self.conversation.close().await
    }

    fn record(&mut self, turn: Turn) {
        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(turn);
    }
}
