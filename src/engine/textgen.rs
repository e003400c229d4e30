use crate::engine::awards::LevelUpEvent;
use crate::engine::error::{EngineError, Result};
use crate::engine::goals::DayGoals;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CongratsRequest {
    pub student_name: String,
    pub level_name: String,
    pub total_xp: i64,
    pub next_level_threshold: Option<i64>,
}

impl From<&LevelUpEvent> for CongratsRequest {
    fn from(ev: &LevelUpEvent) -> Self {
        Self {
            student_name: ev.student_name.clone(),
            level_name: ev.to.name.to_string(),
            total_xp: ev.total_xp,
            next_level_threshold: ev.next_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TipRequest {
    pub grade: i64,
    pub gender: String,
    pub level_name: String,
    pub xp: i64,
    pub goals: DayGoals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseTip {
    pub title: String,
    pub detail: String,
    pub reasoning: String,
}

/// External copywriter. Calls have no effect on domain state.
pub trait TextGenerator: Send + Sync {
    fn congratulate(&self, req: &CongratsRequest) -> Result<String>;
    fn exercise_tip(&self, req: &TipRequest) -> Result<ExerciseTip>;
}

pub fn fallback_congrats(req: &CongratsRequest) -> String {
    format!(
        "축하해요, {}! '{}' 레벨이 되었어요. 오늘도 멋지게 움직여 봐요!",
        req.student_name, req.level_name
    )
}

pub fn fallback_tip() -> ExerciseTip {
    ExerciseTip {
        title: "가볍게 몸풀기".to_string(),
        detail: "운동 전에 5분 동안 제자리 걷기와 스트레칭을 해 보세요.".to_string(),
        reasoning: "몸을 미리 데우면 다치지 않고 더 오래 운동할 수 있어요.".to_string(),
    }
}

/// Used when no text service is configured; every call takes the fallback.
#[derive(Debug, Default)]
pub struct OfflineTextGenerator;

impl TextGenerator for OfflineTextGenerator {
    fn congratulate(&self, _req: &CongratsRequest) -> Result<String> {
        Err(EngineError::Collaborator("no text service configured".into()))
    }

    fn exercise_tip(&self, _req: &TipRequest) -> Result<ExerciseTip> {
        Err(EngineError::Collaborator("no text service configured".into()))
    }
}

#[derive(Debug, Deserialize)]
struct CongratsResponse {
    message: String,
}

pub struct HttpTextGenerator {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpTextGenerator {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Collaborator(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| EngineError::Collaborator(e.to_string()))?;
        resp.json::<Resp>()
            .map_err(|e| EngineError::Collaborator(e.to_string()))
    }
}

impl TextGenerator for HttpTextGenerator {
    fn congratulate(&self, req: &CongratsRequest) -> Result<String> {
        let resp: CongratsResponse = self.post("congrats", req)?;
        let msg = resp.message.trim().to_string();
        if msg.is_empty() {
            return Err(EngineError::Collaborator("empty congratulation".into()));
        }
        Ok(msg)
    }

    fn exercise_tip(&self, req: &TipRequest) -> Result<ExerciseTip> {
        self.post("tip", req)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUpMessage {
    pub level_name: String,
    pub message: String,
    pub from_fallback: bool,
}

#[derive(Debug, Default)]
struct Slot {
    issued: u64,
    applied: Option<(u64, LevelUpMessage)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUpStatus {
    /// A newer request than the shown message is still in flight.
    pub pending: bool,
    pub message: Option<LevelUpMessage>,
}

/// Fetches congratulation copy off the request path. Per student only the
/// result of the most recently issued request is kept; a slower, older
/// request that returns later is dropped.
#[derive(Clone)]
pub struct LevelUpMessenger {
    generator: Arc<dyn TextGenerator>,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl LevelUpMessenger {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn generator(&self) -> &dyn TextGenerator {
        self.generator.as_ref()
    }

    pub fn request(&self, event: &LevelUpEvent) -> JoinHandle<()> {
        let seq = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            let slot = slots.entry(event.student_id.clone()).or_default();
            slot.issued += 1;
            slot.issued
        };
        let req = CongratsRequest::from(event);
        let student_id = event.student_id.clone();
        let generator = Arc::clone(&self.generator);
        let slots = Arc::clone(&self.slots);

        std::thread::spawn(move || {
            let message = match generator.congratulate(&req) {
                Ok(text) => LevelUpMessage {
                    level_name: req.level_name.clone(),
                    message: text,
                    from_fallback: false,
                },
                Err(e) => {
                    tracing::warn!(
                        student_id = %student_id,
                        error = %e,
                        "congratulation fell back to static copy"
                    );
                    LevelUpMessage {
                        level_name: req.level_name.clone(),
                        message: fallback_congrats(&req),
                        from_fallback: true,
                    }
                }
            };
            let mut slots = slots.lock().unwrap_or_else(|p| p.into_inner());
            let slot = slots.entry(student_id.clone()).or_default();
            if slot.issued == seq {
                slot.applied = Some((seq, message));
            } else {
                tracing::debug!(
                    student_id = %student_id,
                    seq,
                    latest = slot.issued,
                    "discarding superseded congratulation"
                );
            }
        })
    }

    pub fn status(&self, student_id: &str) -> LevelUpStatus {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        match slots.get(student_id) {
            Some(slot) => LevelUpStatus {
                pending: slot.applied.as_ref().map(|(s, _)| *s) != Some(slot.issued),
                message: slot.applied.as_ref().map(|(_, m)| m.clone()),
            },
            None => LevelUpStatus {
                pending: false,
                message: None,
            },
        }
    }
}

/// Tip for the student, or the static tip when the service fails.
pub fn tip_or_fallback(generator: &dyn TextGenerator, req: &TipRequest) -> (ExerciseTip, bool) {
    match generator.exercise_tip(req) {
        Ok(tip) => (tip, false),
        Err(e) => {
            tracing::warn!(error = %e, "exercise tip fell back to static copy");
            (fallback_tip(), true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::levels::LEVEL_TIERS;
    use std::sync::mpsc::{channel, Receiver, Sender};

    /// Each call blocks until the test hands it a reply.
    struct Scripted {
        replies: Mutex<Receiver<Result<String>>>,
        started: Mutex<Sender<String>>,
    }

    impl TextGenerator for Scripted {
        fn congratulate(&self, req: &CongratsRequest) -> Result<String> {
            let _ = self
                .started
                .lock()
                .unwrap()
                .send(req.level_name.clone());
            self.replies.lock().unwrap().recv().unwrap()
        }

        fn exercise_tip(&self, _req: &TipRequest) -> Result<ExerciseTip> {
            Err(EngineError::Collaborator("unused".into()))
        }
    }

    fn event(to_rank: usize) -> LevelUpEvent {
        LevelUpEvent {
            student_id: "s1".into(),
            student_name: "가람".into(),
            from: LEVEL_TIERS[to_rank - 1],
            to: LEVEL_TIERS[to_rank],
            total_xp: LEVEL_TIERS[to_rank].min_xp,
            next_threshold: None,
        }
    }

    #[test]
    fn failure_applies_fallback_copy() {
        let messenger = LevelUpMessenger::new(Arc::new(OfflineTextGenerator));
        messenger.request(&event(3)).join().unwrap();
        let status = messenger.status("s1");
        assert!(!status.pending);
        let msg = status.message.unwrap();
        assert!(msg.from_fallback);
        assert!(msg.message.contains("체력 유망주"));
    }

    #[test]
    fn superseded_result_is_discarded() {
        let (reply_tx, reply_rx) = channel();
        let (started_tx, started_rx) = channel();
        let gen = Scripted {
            replies: Mutex::new(reply_rx),
            started: Mutex::new(started_tx),
        };
        let messenger = LevelUpMessenger::new(Arc::new(gen));

        // The generator answers calls in arrival order; `started` tells us
        // which call is waiting for the next reply.
        let older = messenger.request(&event(3));
        assert_eq!(started_rx.recv().unwrap(), "체력 유망주");
        let newer = messenger.request(&event(4));
        assert!(messenger.status("s1").pending);

        // Older call returns; it is already superseded.
        reply_tx.send(Ok("old copy".to_string())).unwrap();
        older.join().unwrap();
        assert!(messenger.status("s1").message.is_none());

        assert_eq!(started_rx.recv().unwrap(), "체력 도전자");
        reply_tx.send(Ok("new copy".to_string())).unwrap();
        newer.join().unwrap();

        let status = messenger.status("s1");
        assert!(!status.pending);
        assert_eq!(status.message.unwrap().message, "new copy");
    }

    #[test]
    fn tip_falls_back_offline() {
        let req = TipRequest {
            grade: 3,
            gender: "female".into(),
            level_name: "체력 새싹".into(),
            xp: 0,
            goals: DayGoals::default(),
        };
        let (tip, fallback) = tip_or_fallback(&OfflineTextGenerator, &req);
        assert!(fallback);
        assert_eq!(tip, fallback_tip());
    }
}
