//! Shared payload catalogue for unit tests.

use serde::{Deserialize, Serialize};

use crate::payload::{Payload, RemoteError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCreate {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchData {
    pub match_id: String,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPayload {
    MatchCreate(MatchCreate),
    Match(MatchData),
    ChannelMessage(ChannelMessage),
    Empty {},
    Error(RemoteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
    MatchCreate,
    Match,
    ChannelMessage,
    Empty,
    Error,
}

impl Payload for TestPayload {
    type Kind = TestKind;

    fn kind(&self) -> TestKind {
        match self {
            TestPayload::MatchCreate(_) => TestKind::MatchCreate,
            TestPayload::Match(_) => TestKind::Match,
            TestPayload::ChannelMessage(_) => TestKind::ChannelMessage,
            TestPayload::Empty {} => TestKind::Empty,
            TestPayload::Error(_) => TestKind::Error,
        }
    }

    fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            TestPayload::Error(err) => Some(err),
            _ => None,
        }
    }
}

pub fn match_payload(match_id: &str) -> TestPayload {
    TestPayload::Match(MatchData {
        match_id: match_id.to_string(),
        size: 1,
    })
}

pub fn channel_message(content: &str) -> TestPayload {
    TestPayload::ChannelMessage(ChannelMessage {
        channel_id: "lobby".to_string(),
        content: content.to_string(),
    })
}
