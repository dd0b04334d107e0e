//! Scripted gateway for tests: replays canned replies in call order and
//! records every request it receives.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ModelGateway, ModelRequest, ModelResponse};
use crate::error::GatewayError;
use crate::models::TokenUsage;

pub enum Reply {
    Text(String),
    Fail(GatewayError),
    Panic(&'static str),
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn timeout() -> Self {
        Self::Fail(GatewayError::Timeout(Duration::from_secs(20)))
    }
}

#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(content)) => Ok(ModelResponse {
                content,
                usage: TokenUsage {
                    input: 100,
                    output: 50,
                },
            }),
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::Panic(message)) => panic!("{}", message),
            None => Err(GatewayError::Network("no scripted reply left".to_string())),
        }
    }
}
