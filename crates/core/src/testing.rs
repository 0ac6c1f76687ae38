//! Test doubles shared by the unit tests.

use crate::models::GenerationOptions;
use crate::skills::llm_helpers::{GenerationRequest, TextGenerator};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    Fail(String),
    /// Never returns; lets tests cancel an in-flight call
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<Step>,
    requests: Vec<GenerationRequest>,
}

/// Returns canned responses in order and records every request
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGenerator {
    pub fn new<S: Into<String>>(replies: Vec<S>) -> Self {
        let generator = Self::default();
        for reply in replies {
            generator.push(Step::Reply(reply.into()));
        }
        generator
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().steps.push_back(step);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.prompt).collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        _options: &GenerationOptions,
    ) -> Result<String> {
        let step = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request.clone());
            script.steps.pop_front()
        };
        match step {
            Some(Step::Reply(text)) => Ok(text),
            Some(Step::Fail(message)) => bail!(message),
            Some(Step::Hang) => std::future::pending().await,
            None => bail!("scripted generator has no more responses"),
        }
    }
}
