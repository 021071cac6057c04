//! Scripted completion backend and recording sleeper

use async_trait::async_trait;
use pstag_classify::external::{CompletionBackend, Sleeper};
use pstag_classify::ClassifierError;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&str) -> (String, Option<String>, f64) + Send + Sync>;

/// Backend that replays queued replies, then answers from a responder
///
/// The responder maps each requested label to `(main, sub, confidence)`.
pub struct ScriptedBackend {
    queued: Mutex<VecDeque<Result<String, ClassifierError>>>,
    responder: Option<Responder>,
    calls: AtomicU32,
    requested: Mutex<Vec<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            responder: None,
            calls: AtomicU32::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn answering<F>(responder: F) -> Self
    where
        F: Fn(&str) -> (String, Option<String>, f64) + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Queue a raw reply for the next call
    pub fn then_reply(self, reply: &str) -> Self {
        self.queued.lock().unwrap().push_back(Ok(reply.to_string()));
        self
    }

    pub fn then_fail(self, error: ClassifierError) -> Self {
        self.queued.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Labels sent in each call, in call order
    pub fn requested(&self) -> Vec<Vec<String>> {
        self.requested.lock().unwrap().clone()
    }
}

/// Pull the label list back out of a request
pub fn labels_in_prompt(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .skip_while(|line| !line.starts_with("# Tags to classify"))
        .nth(1)
        .and_then(|line| serde_json::from_str(line).ok())
        .unwrap_or_default()
}

/// Structured reply for `entries` of `(tag, main, sub, confidence)`
pub fn reply_for(entries: &[(String, String, Option<String>, f64)]) -> String {
    let items: Vec<_> = entries
        .iter()
        .map(|(tag, main, sub, confidence)| {
            json!({
                "tag": tag,
                "main_category": main,
                "sub_category": sub,
                "confidence": confidence,
                "reasoning": "scripted"
            })
        })
        .collect();
    json!({ "classifications": items }).to_string()
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str) -> Result<String, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let labels = labels_in_prompt(prompt);
        self.requested.lock().unwrap().push(labels.clone());

        if let Some(reply) = self.queued.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.responder {
            Some(responder) => {
                let entries: Vec<_> = labels
                    .into_iter()
                    .map(|label| {
                        let (main, sub, confidence) = responder(&label);
                        (label, main, sub, confidence)
                    })
                    .collect();
                Ok(reply_for(&entries))
            }
            None => Err(ClassifierError::Transport("no scripted reply".into())),
        }
    }
}

/// Sleeper that records requested delays without waiting
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}
