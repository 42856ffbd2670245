#[cfg(test)]
use crate::api::ChatRequest;
#[cfg(test)]
use crate::core::app::App;
#[cfg(test)]
use crate::core::session::{
    ChatBackend, FragmentStream, SessionAdapter, SessionError, SessionSettings,
};
#[cfg(test)]
use async_trait::async_trait;
#[cfg(test)]
use futures_util::stream::{self, StreamExt};
#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Canned outcome for one request to [`FakeBackend`].
#[cfg(test)]
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    Stream(Vec<Result<String, SessionError>>),
    Reject(SessionError),
}

#[cfg(test)]
impl ScriptedReply {
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Stream(fragments.into_iter().map(|f| Ok(f.into())).collect())
    }

    pub fn fragments_then_error<I, S>(fragments: I, error: SessionError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<Result<String, SessionError>> =
            fragments.into_iter().map(|f| Ok(f.into())).collect();
        items.push(Err(error));
        Self::Stream(items)
    }
}

/// In-memory [`ChatBackend`] that records requests and replays scripted replies.
///
/// Requests beyond the script get an empty stream.
#[cfg(test)]
#[derive(Default)]
pub struct FakeBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<(String, ChatRequest)>>,
}

#[cfg(test)]
impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: ScriptedReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<(String, ChatRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl ChatBackend for FakeBackend {
    async fn stream_chat(
        &self,
        api_key: &str,
        request: ChatRequest,
    ) -> Result<FragmentStream, SessionError> {
        self.requests
            .lock()
            .unwrap()
            .push((api_key.to_string(), request));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedReply::Stream(Vec::new()));
        match reply {
            ScriptedReply::Stream(items) => Ok(stream::iter(items).boxed()),
            ScriptedReply::Reject(err) => Err(err),
        }
    }
}

#[cfg(test)]
pub fn create_test_adapter(backend: Arc<FakeBackend>, api_key: Option<&str>) -> SessionAdapter {
    SessionAdapter::new(
        backend,
        api_key.map(str::to_string),
        SessionSettings::with_model("test-model"),
    )
}

#[cfg(test)]
pub fn create_test_app() -> (App, Arc<FakeBackend>) {
    let backend = Arc::new(FakeBackend::new());
    let adapter = create_test_adapter(backend.clone(), Some("test-key"));
    (App::new(adapter, "Hello from the tutor.", None), backend)
}
